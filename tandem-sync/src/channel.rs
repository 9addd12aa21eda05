//! Point-to-point messaging channel
//!
//! Frames are appended (never replacing) to the target peer's command
//! property, so frames from independent senders interleave safely: each
//! is self-length-delimited. The receiver consumes a whole batch with
//! read-with-delete and dispatches frame by frame until the batch is
//! exhausted.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, error, trace};

use tandem_protocol::codec::{encode_frames, CodecError, FrameCodec};
use tandem_protocol::{Frame, WindowHandle};

use crate::store::{PropertyEvent, PropertyStore, StoreError};

/// Messaging error
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The target window disappeared between discovery and send. Not
    /// retried automatically; the caller decides whether to re-discover
    /// and retry once.
    #[error("peer {0} vanished before delivery")]
    PeerGone(WindowHandle),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<StoreError> for ChannelError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::WindowGone(w) => ChannelError::PeerGone(w),
            other => ChannelError::Store(other),
        }
    }
}

/// What the embedding editor does with an inbound frame.
///
/// All methods run on the one event-dispatch thread.
pub trait FrameHandler {
    /// This process's own view window, reported in ping replies
    fn window(&self) -> WindowHandle;

    /// Hand a command line to the local interpreter as if the user typed
    /// it. Implementations should also synthesize a keystroke-equivalent
    /// event so the interpreter's event loop wakes and runs it promptly.
    fn execute(&mut self, command: &str);

    /// Force local input focus to this view (or its input-oriented
    /// sub-view), raising it above obscuring windows if needed
    fn focus(&mut self, prefer_input: bool);

    /// Mark the whole view for redraw. Called when a frame cannot be
    /// interpreted, since its effect on screen state is unknown.
    fn mark_full_redraw(&mut self);
}

/// Channel operations over one pair of property names
pub struct Channel<'a, S: PropertyStore> {
    store: &'a S,
    command_prop: &'a str,
    cc_request_prop: &'a str,
}

impl<'a, S: PropertyStore> Channel<'a, S> {
    pub fn new(store: &'a S, command_prop: &'a str, cc_request_prop: &'a str) -> Self {
        Self {
            store,
            command_prop,
            cc_request_prop,
        }
    }

    /// Append one or more frames to the target's command property and
    /// flush.
    pub fn send(&self, target: WindowHandle, frames: &[Frame]) -> Result<(), ChannelError> {
        let batch = encode_frames(frames)?;
        self.store.append(target, self.command_prop, batch.to_vec())?;
        self.store.flush()?;
        trace!(target = %target, count = frames.len(), "frames sent");
        Ok(())
    }

    /// Consume and dispatch one inbound batch. Called from the embedder's
    /// event loop on a property-change notification; delete notifications
    /// and foreign properties are ignored. Returns the number of frames
    /// dispatched. A frame whose declared length would overrun the batch
    /// stops processing (frames already dispatched stay dispatched) and
    /// is reported as a codec error.
    pub fn receive_and_dispatch(
        &self,
        event: &PropertyEvent,
        handler: &mut dyn FrameHandler,
    ) -> Result<usize, ChannelError> {
        let window = match event {
            PropertyEvent::NewValue { window, property } if property == self.command_prop => {
                *window
            }
            _ => return Ok(0),
        };

        let Some(raw) = self.store.take(window, self.command_prop)? else {
            return Ok(0);
        };

        let mut batch = BytesMut::from(&raw[..]);
        let mut codec = FrameCodec::new();
        let mut dispatched = 0;

        loop {
            match codec.decode(&mut batch) {
                Ok(None) => break,
                Ok(Some(frame)) => {
                    self.dispatch(frame, handler)?;
                    dispatched += 1;
                }
                Err(e) => {
                    error!(error = %e, dispatched, "malformed frame batch; rest discarded");
                    return Err(e.into());
                }
            }
        }

        Ok(dispatched)
    }

    fn dispatch(&self, frame: Frame, handler: &mut dyn FrameHandler) -> Result<(), ChannelError> {
        match frame {
            Frame::Execute { command } => handler.execute(&command),
            Frame::Ping {
                reply_window,
                reply_property,
            } => {
                let mut reply = BytesMut::with_capacity(4);
                reply.put_u32(handler.window().raw());
                // The requester may already be gone; nobody is left to
                // read the reply, so the remaining frames still run
                match self.store.append(reply_window, &reply_property, reply.to_vec()) {
                    Ok(()) => self.store.flush()?,
                    Err(StoreError::WindowGone(w)) => {
                        debug!(requester = %w, "ping requester gone; reply dropped")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Frame::Focus { prefer_input } => handler.focus(prefer_input),
            Frame::Unknown { kind } => {
                error!(kind, "unrecognized frame kind; forcing full redraw");
                handler.mark_full_redraw();
            }
        }
        Ok(())
    }

    /// Post the initial hand-off command line for a peer (replace, not
    /// append: the hand-off is single-shot).
    pub fn post_cc_request(&self, target: WindowHandle, line: &str) -> Result<(), ChannelError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(0);
        self.store.replace(target, self.cc_request_prop, data)?;
        self.store.flush()?;
        Ok(())
    }

    /// Consume the hand-off command line, if one is pending
    pub fn take_cc_request(&self, view: WindowHandle) -> Result<Option<String>, ChannelError> {
        let Some(raw) = self.store.take(view, self.cc_request_prop)? else {
            return Ok(None);
        };

        let end = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::BadPayload("missing NUL terminator"))?;
        let line = std::str::from_utf8(&raw[..end])
            .map_err(|_| CodecError::BadPayload("invalid UTF-8"))?;
        Ok(Some(line.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use bytes::Buf;
    use tandem_protocol::props;

    struct RecordingHandler {
        window: WindowHandle,
        executed: Vec<String>,
        focused: Vec<bool>,
        full_redraws: usize,
    }

    impl RecordingHandler {
        fn new(window: WindowHandle) -> Self {
            Self {
                window,
                executed: Vec::new(),
                focused: Vec::new(),
                full_redraws: 0,
            }
        }
    }

    impl FrameHandler for RecordingHandler {
        fn window(&self) -> WindowHandle {
            self.window
        }
        fn execute(&mut self, command: &str) {
            self.executed.push(command.to_owned());
        }
        fn focus(&mut self, prefer_input: bool) {
            self.focused.push(prefer_input);
        }
        fn mark_full_redraw(&mut self) {
            self.full_redraws += 1;
        }
    }

    fn channel(store: &MemStore) -> Channel<'_, MemStore> {
        Channel::new(store, props::COMMAND, props::CC_REQUEST)
    }

    fn new_value(window: WindowHandle) -> PropertyEvent {
        PropertyEvent::NewValue {
            window,
            property: props::COMMAND.to_owned(),
        }
    }

    #[test]
    fn test_batch_dispatches_in_append_order() {
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        ch.send(w.view, &[Frame::Execute { command: "one".into() }])
            .unwrap();
        ch.send(
            w.view,
            &[
                Frame::Execute { command: "two".into() },
                Frame::Focus { prefer_input: false },
            ],
        )
        .unwrap();

        let mut handler = RecordingHandler::new(w.view);
        let n = ch
            .receive_and_dispatch(&new_value(w.view), &mut handler)
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(handler.executed, vec!["one", "two"]);
        assert_eq!(handler.focused, vec![false]);
    }

    #[test]
    fn test_batch_consumed_exactly_once() {
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        ch.send(w.view, &[Frame::Execute { command: "x".into() }])
            .unwrap();

        let mut handler = RecordingHandler::new(w.view);
        assert_eq!(
            ch.receive_and_dispatch(&new_value(w.view), &mut handler)
                .unwrap(),
            1
        );
        assert_eq!(
            ch.receive_and_dispatch(&new_value(w.view), &mut handler)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_delete_notifications_ignored() {
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        ch.send(w.view, &[Frame::Execute { command: "x".into() }])
            .unwrap();

        let mut handler = RecordingHandler::new(w.view);
        let event = PropertyEvent::Deleted {
            window: w.view,
            property: props::COMMAND.to_owned(),
        };
        assert_eq!(ch.receive_and_dispatch(&event, &mut handler).unwrap(), 0);
        // The batch is still there for the real notification
        assert_eq!(
            ch.receive_and_dispatch(&new_value(w.view), &mut handler)
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_send_to_gone_window_is_peer_gone() {
        let store = MemStore::new();
        let w = store.add_window();
        store.destroy_window(w.frame);

        let ch = channel(&store);
        assert!(matches!(
            ch.send(w.view, &[Frame::Focus { prefer_input: true }]),
            Err(ChannelError::PeerGone(_))
        ));
    }

    #[test]
    fn test_ping_appends_one_handle_to_reply_property() {
        let store = MemStore::new();
        let requester = store.add_window();
        let responder = store.add_window();
        let ch = channel(&store);

        ch.send(
            responder.view,
            &[Frame::Ping {
                reply_window: requester.view,
                reply_property: "TANDEM_REPLY".into(),
            }],
        )
        .unwrap();

        let mut handler = RecordingHandler::new(responder.view);
        ch.receive_and_dispatch(&new_value(responder.view), &mut handler)
            .unwrap();

        let reply = store.read(requester.view, "TANDEM_REPLY").unwrap().unwrap();
        assert_eq!(reply.len(), 4);
        assert_eq!((&reply[..]).get_u32(), responder.view.raw());
    }

    #[test]
    fn test_self_ping() {
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        ch.send(
            w.view,
            &[Frame::Ping {
                reply_window: w.view,
                reply_property: "TANDEM_REPLY".into(),
            }],
        )
        .unwrap();

        let mut handler = RecordingHandler::new(w.view);
        ch.receive_and_dispatch(&new_value(w.view), &mut handler)
            .unwrap();

        let reply = store.read(w.view, "TANDEM_REPLY").unwrap().unwrap();
        assert_eq!((&reply[..]).get_u32(), w.view.raw());
    }

    #[test]
    fn test_ping_from_gone_requester_does_not_abort_batch() {
        let store = MemStore::new();
        let requester = store.add_window();
        let responder = store.add_window();
        let ch = channel(&store);

        ch.send(
            responder.view,
            &[
                Frame::Ping {
                    reply_window: requester.view,
                    reply_property: "TANDEM_REPLY".into(),
                },
                Frame::Execute { command: "after".into() },
            ],
        )
        .unwrap();
        store.destroy_window(requester.frame);

        let mut handler = RecordingHandler::new(responder.view);
        let n = ch
            .receive_and_dispatch(&new_value(responder.view), &mut handler)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(handler.executed, vec!["after"]);
    }

    #[test]
    fn test_unknown_kind_marks_full_redraw_and_continues() {
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        // Hand-build a batch: unknown frame, then a real one
        let mut batch = BytesMut::new();
        batch.put_u16(8);
        batch.put_u16(4040);
        batch.put_bytes(0, 4);
        store.append(w.view, props::COMMAND, batch.to_vec()).unwrap();
        ch.send(w.view, &[Frame::Execute { command: "still here".into() }])
            .unwrap();

        let mut handler = RecordingHandler::new(w.view);
        let n = ch
            .receive_and_dispatch(&new_value(w.view), &mut handler)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(handler.full_redraws, 1);
        assert_eq!(handler.executed, vec!["still here"]);
    }

    #[test]
    fn test_overrun_stops_batch_after_valid_prefix() {
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        ch.send(w.view, &[Frame::Execute { command: "good".into() }])
            .unwrap();
        // Corrupt tail: declares 64 bytes, supplies 8
        let mut tail = BytesMut::new();
        tail.put_u16(64);
        tail.put_u16(1);
        tail.put_bytes(0, 4);
        store.append(w.view, props::COMMAND, tail.to_vec()).unwrap();

        let mut handler = RecordingHandler::new(w.view);
        let err = ch
            .receive_and_dispatch(&new_value(w.view), &mut handler)
            .unwrap_err();
        assert!(matches!(err, ChannelError::Codec(CodecError::FrameOverrun { .. })));
        // The valid prefix was dispatched before the violation
        assert_eq!(handler.executed, vec!["good"]);
        // And the poisoned batch was consumed, not left to loop forever
        assert!(store.read(w.view, props::COMMAND).unwrap().is_none());
    }

    #[test]
    fn test_cc_request_roundtrip() {
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        assert_eq!(ch.take_cc_request(w.view).unwrap(), None);
        ch.post_cc_request(w.view, "edit +42 /tmp/notes").unwrap();
        assert_eq!(
            ch.take_cc_request(w.view).unwrap(),
            Some("edit +42 /tmp/notes".to_owned())
        );
        assert_eq!(ch.take_cc_request(w.view).unwrap(), None);
    }

    #[test]
    fn test_interleaved_senders_all_dispatched() {
        // Two peers append between one take and the next; appends are
        // atomic with respect to take, so nothing is torn or lost.
        let store = MemStore::new();
        let w = store.add_window();
        let ch = channel(&store);

        ch.send(w.view, &[Frame::Execute { command: "from-a".into() }])
            .unwrap();
        ch.send(w.view, &[Frame::Execute { command: "from-b".into() }])
            .unwrap();

        let mut handler = RecordingHandler::new(w.view);
        let n = ch
            .receive_and_dispatch(&new_value(w.view), &mut handler)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(handler.executed, vec!["from-a", "from-b"]);
    }
}
