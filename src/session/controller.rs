//! Session controller: one compile request over one duplex connection.
//!
//! Sends the opening message, then demultiplexes inbound frames. Binary
//! frames stream straight into the sink in arrival order; text frames are
//! decoded as status messages and resolve duration references.

use std::io::Write;

use tracing::{debug, trace, warn};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::Message;

use super::cancel::CancelToken;
use super::transport::{is_timeout, FrameTransport};
use crate::error::{PodioError, Result};
use crate::wire::{FetchContext, StatusMessage};

/// Read-loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFrame,
    Streaming,
    Closed,
}

/// Counters for a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub bytes: u64,
    pub durations_resolved: usize,
}

/// Owns the connection and reference table for a single compile call.
///
/// The connection is closed when the session is dropped, whatever the outcome.
pub struct Session<'a, T: FrameTransport, W: Write> {
    transport: T,
    sink: &'a mut W,
    context: FetchContext,
    cancel: CancelToken,
    state: SessionState,
    summary: SessionSummary,
}

impl<'a, T: FrameTransport, W: Write> Session<'a, T, W> {
    pub fn new(transport: T, context: FetchContext, sink: &'a mut W, cancel: CancelToken) -> Self {
        Self {
            transport,
            sink,
            context,
            cancel,
            state: SessionState::AwaitingFrame,
            summary: SessionSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send `opening` and stream frames until the peer closes.
    pub fn run(&mut self, opening: String) -> Result<SessionSummary> {
        debug!(bytes = opening.len(), "sending compile request");
        self.send_opening(opening)?;

        let result = self.read_loop();
        self.state = SessionState::Closed;
        match &result {
            Ok(summary) => debug!(
                frames = summary.frames,
                bytes = summary.bytes,
                durations = summary.durations_resolved,
                "session closed"
            ),
            Err(e) => debug!(error = %e, "session failed"),
        }
        result
    }

    /// A write timeout leaves the frame buffered; keep flushing until it
    /// drains or the call is cancelled.
    fn send_opening(&mut self, opening: String) -> Result<()> {
        let mut sent = self.transport.send_text(opening);
        loop {
            match sent {
                Ok(()) => return Ok(()),
                Err(e) if is_timeout(&e) => {
                    if self.cancel.is_cancelled() {
                        return Err(PodioError::Cancelled);
                    }
                    trace!("opening message still buffered");
                    sent = self.transport.flush();
                }
                Err(e) => return Err(PodioError::Send(e)),
            }
        }
    }

    fn read_loop(&mut self) -> Result<SessionSummary> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PodioError::Cancelled);
            }
            let frame = match self.transport.read_frame() {
                Ok(frame) => frame,
                Err(e) if is_timeout(&e) => continue,
                // Only reported once a close handshake has completed.
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break;
                }
                Err(e) => return Err(PodioError::Read(e)),
            };

            if self.state == SessionState::AwaitingFrame {
                self.state = SessionState::Streaming;
            }

            match frame {
                Message::Binary(bytes) => self.write_audio(&bytes)?,
                Message::Text(text) => self.handle_status(&text)?,
                Message::Close(frame) => {
                    close_outcome(frame)?;
                    break;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        self.sink.flush().map_err(PodioError::SinkWrite)?;
        Ok(self.summary)
    }

    fn write_audio(&mut self, bytes: &[u8]) -> Result<()> {
        trace!(len = bytes.len(), "audio frame");
        self.sink.write_all(bytes).map_err(PodioError::SinkWrite)?;
        self.summary.frames += 1;
        self.summary.bytes += bytes.len() as u64;
        Ok(())
    }

    fn handle_status(&mut self, text: &str) -> Result<()> {
        self.summary.frames += 1;
        match StatusMessage::decode(text)? {
            StatusMessage::SaveDuration { tag, duration } => {
                trace!(%tag, ?duration, "duration resolved");
                self.context.resolve(&tag, duration)?;
                self.summary.durations_resolved += 1;
            }
            StatusMessage::Other(kind) => {
                warn!(kind = %kind, "ignoring unhandled status message");
            }
        }
        Ok(())
    }
}

impl<T: FrameTransport, W: Write> Drop for Session<'_, T, W> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

/// A close frame without a status code, or with `Normal`, ends the call successfully.
fn close_outcome(frame: Option<CloseFrame<'_>>) -> Result<()> {
    match frame {
        None => Ok(()),
        Some(frame) if frame.code == CloseCode::Normal => Ok(()),
        Some(frame) => {
            warn!(code = u16::from(frame.code), reason = %frame.reason, "abnormal close");
            Err(PodioError::AbnormalClose {
                code: frame.code.into(),
                reason: frame.reason.into_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{remote, DurationSlot};
    use crate::error::ProtocolViolation;
    use crate::wire::serialize;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays a fixed sequence of read results and records what was sent.
    struct ScriptedTransport {
        frames: VecDeque<tungstenite::Result<Message>>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<bool>>,
        fail_send: bool,
        /// Writes that time out before the opening message drains.
        stalled_writes: usize,
    }

    impl ScriptedTransport {
        fn new(frames: Vec<tungstenite::Result<Message>>) -> Self {
            Self {
                frames: frames.into(),
                sent: Arc::default(),
                closed: Arc::default(),
                fail_send: false,
                stalled_writes: 0,
            }
        }

        fn write_attempt(&mut self) -> tungstenite::Result<()> {
            if self.stalled_writes == 0 {
                return Ok(());
            }
            self.stalled_writes -= 1;
            Err(tungstenite::Error::Io(io::Error::from(io::ErrorKind::WouldBlock)))
        }
    }

    impl FrameTransport for ScriptedTransport {
        fn send_text(&mut self, text: String) -> tungstenite::Result<()> {
            if self.fail_send {
                return Err(tungstenite::Error::AlreadyClosed);
            }
            self.sent.lock().unwrap().push(text);
            self.write_attempt()
        }

        fn flush(&mut self) -> tungstenite::Result<()> {
            self.write_attempt()
        }

        fn read_frame(&mut self) -> tungstenite::Result<Message> {
            self.frames
                .pop_front()
                .unwrap_or(Err(tungstenite::Error::ConnectionClosed))
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn normal_close() -> tungstenite::Result<Message> {
        Ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
    }

    fn save_duration_frame(tag: &str, nanos: i64) -> tungstenite::Result<Message> {
        Ok(Message::Text(format!(
            r#"{{"type":"saveDuration","_saveDuration":{{"tag":"{tag}","duration":{nanos}}}}}"#
        )))
    }

    fn run(
        transport: ScriptedTransport,
        context: FetchContext,
        sink: &mut Vec<u8>,
    ) -> Result<SessionSummary> {
        Session::new(transport, context, sink, CancelToken::new()).run("{}".to_string())
    }

    #[test]
    fn sends_opening_message_first() {
        let transport = ScriptedTransport::new(vec![normal_close()]);
        let sent = transport.sent.clone();
        let mut sink = Vec::new();
        Session::new(transport, FetchContext::new(), &mut sink, CancelToken::new())
            .run(r#"{"format":"wav"}"#.to_string())
            .unwrap();
        assert_eq!(*sent.lock().unwrap(), [r#"{"format":"wav"}"#]);
    }

    #[test]
    fn binary_frames_are_written_in_order() {
        let transport = ScriptedTransport::new(vec![
            Ok(Message::Binary(vec![1, 2])),
            Ok(Message::Binary(vec![3])),
            Ok(Message::Binary(vec![4, 5, 6])),
            normal_close(),
        ]);
        let mut sink = Vec::new();
        let summary = run(transport, FetchContext::new(), &mut sink).unwrap();
        assert_eq!(sink, [1, 2, 3, 4, 5, 6]);
        assert_eq!(summary.bytes, 6);
        assert_eq!(summary.frames, 3);
    }

    #[test]
    fn close_with_no_frames_succeeds() {
        let mut sink = Vec::new();
        let summary = run(
            ScriptedTransport::new(vec![normal_close()]),
            FetchContext::new(),
            &mut sink,
        )
        .unwrap();
        assert!(sink.is_empty());
        assert_eq!(summary, SessionSummary::default());
    }

    #[test]
    fn close_without_code_succeeds() {
        let mut sink = Vec::new();
        let transport = ScriptedTransport::new(vec![
            Ok(Message::Binary(vec![9])),
            Ok(Message::Close(None)),
        ]);
        run(transport, FetchContext::new(), &mut sink).unwrap();
        assert_eq!(sink, [9]);
    }

    #[test]
    fn abnormal_close_carries_code() {
        let transport = ScriptedTransport::new(vec![
            Ok(Message::Binary(vec![7])),
            Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "render failed".into(),
            }))),
        ]);
        let mut sink = Vec::new();
        let err = run(transport, FetchContext::new(), &mut sink).unwrap_err();
        match err {
            PodioError::AbnormalClose { code, reason } => {
                assert_eq!(code, 1011);
                assert_eq!(reason, "render failed");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sink, [7], "partial output is kept");
    }

    #[test]
    fn save_duration_resolves_slot() {
        let slot = DurationSlot::new();
        let mut context = FetchContext::new();
        let doc = serialize(&remote("a").save_duration(&slot), &mut context).unwrap();
        let tag = doc["duration_ref"].as_str().unwrap().to_string();

        let transport = ScriptedTransport::new(vec![
            Ok(Message::Binary(vec![0; 4])),
            save_duration_frame(&tag, 1_200_000_000),
            normal_close(),
        ]);
        let mut sink = Vec::new();
        let summary = run(transport, context, &mut sink).unwrap();
        assert_eq!(slot.get(), Some(Duration::from_millis(1200)));
        assert_eq!(summary.durations_resolved, 1);
    }

    #[test]
    fn unknown_tag_is_protocol_error() {
        let transport = ScriptedTransport::new(vec![
            save_duration_frame("bogus", 1),
            Ok(Message::Binary(vec![1])),
            normal_close(),
        ]);
        let mut sink = Vec::new();
        let err = run(transport, FetchContext::new(), &mut sink).unwrap_err();
        assert!(matches!(
            err,
            PodioError::Protocol(ProtocolViolation::UnknownReference(ref t)) if t == "bogus"
        ));
        assert!(sink.is_empty(), "loop stops at the bad message");
    }

    #[test]
    fn duplicate_resolution_is_protocol_error() {
        let slot = DurationSlot::new();
        let mut context = FetchContext::new();
        let tag = context.register(&slot);
        let transport = ScriptedTransport::new(vec![
            save_duration_frame(&tag, 10),
            save_duration_frame(&tag, 20),
            normal_close(),
        ]);
        let mut sink = Vec::new();
        let err = run(transport, context, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            PodioError::Protocol(ProtocolViolation::DuplicateReference(_))
        ));
        assert_eq!(slot.get(), Some(Duration::from_nanos(10)));
    }

    #[test]
    fn malformed_status_is_protocol_error() {
        let transport = ScriptedTransport::new(vec![Ok(Message::Text("{oops".into()))]);
        let mut sink = Vec::new();
        let err = run(transport, FetchContext::new(), &mut sink).unwrap_err();
        assert!(matches!(
            err,
            PodioError::Protocol(ProtocolViolation::MalformedStatus(_))
        ));
    }

    #[test]
    fn unhandled_status_types_are_ignored() {
        let transport = ScriptedTransport::new(vec![
            Ok(Message::Text(r#"{"type":"progress","value":0.5}"#.into())),
            Ok(Message::Binary(vec![1])),
            normal_close(),
        ]);
        let mut sink = Vec::new();
        run(transport, FetchContext::new(), &mut sink).unwrap();
        assert_eq!(sink, [1]);
    }

    #[test]
    fn timeouts_keep_reading() {
        let transport = ScriptedTransport::new(vec![
            Err(tungstenite::Error::Io(io::Error::from(io::ErrorKind::WouldBlock))),
            Ok(Message::Binary(vec![1])),
            Err(tungstenite::Error::Io(io::Error::from(io::ErrorKind::TimedOut))),
            normal_close(),
        ]);
        let mut sink = Vec::new();
        run(transport, FetchContext::new(), &mut sink).unwrap();
        assert_eq!(sink, [1]);
    }

    #[test]
    fn transport_error_is_read_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(Message::Binary(vec![1])),
            Err(tungstenite::Error::Io(io::Error::from(
                io::ErrorKind::ConnectionReset,
            ))),
        ]);
        let mut sink = Vec::new();
        let err = run(transport, FetchContext::new(), &mut sink).unwrap_err();
        assert!(matches!(err, PodioError::Read(_)));
    }

    #[test]
    fn send_failure_is_send_error() {
        let mut transport = ScriptedTransport::new(vec![normal_close()]);
        transport.fail_send = true;
        let closed = transport.closed.clone();
        let mut sink = Vec::new();
        let err = run(transport, FetchContext::new(), &mut sink).unwrap_err();
        assert!(matches!(err, PodioError::Send(_)));
        assert!(*closed.lock().unwrap(), "connection released on error");
    }

    #[test]
    fn cancellation_stops_the_loop() {
        let transport = ScriptedTransport::new(vec![
            Ok(Message::Binary(vec![1])),
            Ok(Message::Binary(vec![2])),
        ]);
        let closed = transport.closed.clone();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = Vec::new();
        let err = Session::new(transport, FetchContext::new(), &mut sink, cancel)
            .run("{}".into())
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn connection_is_released_on_success() {
        let transport = ScriptedTransport::new(vec![normal_close()]);
        let closed = transport.closed.clone();
        let mut sink = Vec::new();
        run(transport, FetchContext::new(), &mut sink).unwrap();
        assert!(*closed.lock().unwrap());
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_sink_write_error() {
        let transport = ScriptedTransport::new(vec![Ok(Message::Binary(vec![1]))]);
        let mut sink = FailingSink;
        let err = Session::new(transport, FetchContext::new(), &mut sink, CancelToken::new())
            .run("{}".into())
            .unwrap_err();
        assert!(matches!(err, PodioError::SinkWrite(_)));
    }

    #[test]
    fn state_transitions() {
        let mut sink = Vec::new();
        let mut session = Session::new(
            ScriptedTransport::new(vec![Ok(Message::Binary(vec![1])), normal_close()]),
            FetchContext::new(),
            &mut sink,
            CancelToken::new(),
        );
        assert_eq!(session.state(), SessionState::AwaitingFrame);
        session.run("{}".into()).unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn stalled_send_is_flushed_until_drained() {
        let mut transport =
            ScriptedTransport::new(vec![Ok(Message::Binary(vec![1])), normal_close()]);
        transport.stalled_writes = 3;
        let sent = transport.sent.clone();
        let mut sink = Vec::new();
        run(transport, FetchContext::new(), &mut sink).unwrap();
        assert_eq!(sent.lock().unwrap().len(), 1, "the frame is sent once");
        assert_eq!(sink, [1]);
    }

    #[test]
    fn stalled_send_observes_cancel() {
        let mut transport = ScriptedTransport::new(vec![normal_close()]);
        transport.stalled_writes = usize::MAX;
        let closed = transport.closed.clone();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = Vec::new();
        let err = Session::new(transport, FetchContext::new(), &mut sink, cancel)
            .run("{}".to_string())
            .unwrap_err();
        assert!(err.is_cancelled(), "got {err:?}");
        assert!(*closed.lock().unwrap());
    }
}
