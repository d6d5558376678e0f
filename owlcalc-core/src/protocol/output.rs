//! Ack-gated output side channel
//!
//! The engine pushes unsolicited text (environment load notices, help
//! output, print statements) while a background poller drains it on its
//! own cadence. The single slot stays occupied from `emit` until the
//! poller calls `done`, and the engine never waits longer than its ack
//! timeout for that to happen: pushes are dropped under backpressure.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_deadline, with_timeout, Duration, Instant};

use crate::buffer::{BoundedText, LengthExceeded};
use crate::log::{trace, warn};

/// Errors from pushing output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EmitError {
    /// The previous message was not acknowledged in time; push dropped
    AckTimeout,
    /// Text does not fit the output slot
    LengthExceeded(LengthExceeded),
}

impl From<LengthExceeded> for EmitError {
    fn from(e: LengthExceeded) -> Self {
        EmitError::LengthExceeded(e)
    }
}

/// Message carried by the output slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMessage<const N: usize> {
    /// Text to append to the output view
    Text(BoundedText<N>),
    /// Request to clear the output view
    Clear,
}

impl<const N: usize> OutputMessage<N> {
    /// Text of the message, empty for [`OutputMessage::Clear`]
    pub fn text(&self) -> &str {
        match self {
            OutputMessage::Text(text) => text.as_str(),
            OutputMessage::Clear => "",
        }
    }
}

struct OutputSlot<const N: usize> {
    occupied: bool,
    message: Option<OutputMessage<N>>,
    delivered: u32,
    dropped: u32,
}

/// Single-slot, ack-gated output mailbox
pub struct OutputChannel<const N: usize> {
    slot: BlockingMutex<CriticalSectionRawMutex, RefCell<OutputSlot<N>>>,
    /// "Output pending"
    pending: Signal<CriticalSectionRawMutex, ()>,
    /// "Output slot free"
    freed: Signal<CriticalSectionRawMutex, ()>,
}

impl<const N: usize> Default for OutputChannel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> OutputChannel<N> {
    /// Create a channel with a free slot
    pub const fn new() -> Self {
        Self {
            slot: BlockingMutex::new(RefCell::new(OutputSlot {
                occupied: false,
                message: None,
                delivered: 0,
                dropped: 0,
            })),
            pending: Signal::new(),
            freed: Signal::new(),
        }
    }

    /// Push text, waiting up to `ack_timeout` for the slot to be free
    pub async fn emit(&self, text: &str, ack_timeout: Duration) -> Result<(), EmitError> {
        let text = BoundedText::from_text(text)?;
        self.push(OutputMessage::Text(text), ack_timeout).await
    }

    /// Push a clear request, waiting up to `ack_timeout` for the slot
    pub async fn clear(&self, ack_timeout: Duration) -> Result<(), EmitError> {
        self.push(OutputMessage::Clear, ack_timeout).await
    }

    async fn push(&self, message: OutputMessage<N>, ack_timeout: Duration) -> Result<(), EmitError> {
        let deadline = Instant::now() + ack_timeout;
        let mut message = Some(message);

        loop {
            let claimed = self.slot.lock(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.occupied {
                    return false;
                }
                slot.occupied = true;
                slot.message = message.take();
                slot.delivered = slot.delivered.wrapping_add(1);
                true
            });

            if claimed {
                trace!("output pushed");
                self.pending.signal(());
                return Ok(());
            }

            if with_deadline(deadline, self.freed.wait()).await.is_err() {
                let dropped = self.slot.lock(|slot| {
                    let mut slot = slot.borrow_mut();
                    slot.dropped = slot.dropped.wrapping_add(1);
                    slot.dropped
                });
                warn!("output ack timeout, push dropped ({} total)", dropped);
                return Err(EmitError::AckTimeout);
            }
        }
    }

    /// Wait up to `timeout` for pushed output
    ///
    /// The slot stays occupied until [`done`](OutputChannel::done) is called.
    pub async fn poll(&self, timeout: Duration) -> Option<OutputMessage<N>> {
        with_timeout(timeout, self.pending.wait()).await.ok()?;
        self.slot.lock(|slot| slot.borrow().message.clone())
    }

    /// Acknowledge the polled message and free the slot
    pub fn done(&self) {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            slot.occupied = false;
            slot.message = None;
        });
        self.freed.signal(());
    }

    /// Check if the slot holds an unacknowledged message
    pub fn is_occupied(&self) -> bool {
        self.slot.lock(|slot| slot.borrow().occupied)
    }

    /// Number of messages accepted into the slot
    pub fn delivered(&self) -> u32 {
        self.slot.lock(|slot| slot.borrow().delivered)
    }

    /// Number of pushes dropped on ack timeout
    pub fn dropped(&self) -> u32 {
        self.slot.lock(|slot| slot.borrow().dropped)
    }

    /// Create an engine-side handle with a fixed ack timeout
    pub fn emitter(&self, ack_timeout: Duration) -> Emitter<'_, N> {
        Emitter {
            channel: self,
            ack_timeout,
        }
    }
}

/// Engine-side handle to the output channel
///
/// Replaces the raw print callback handed to the engine: every push is
/// bounded by the ack timeout.
#[derive(Clone, Copy)]
pub struct Emitter<'a, const N: usize> {
    channel: &'a OutputChannel<N>,
    ack_timeout: Duration,
}

impl<const N: usize> Emitter<'_, N> {
    /// Push a single message's worth of text
    pub async fn emit(&self, text: &str) -> Result<(), EmitError> {
        self.channel.emit(text, self.ack_timeout).await
    }

    /// Ask the output view to clear
    pub async fn clear(&self) -> Result<(), EmitError> {
        self.channel.clear(self.ack_timeout).await
    }

    /// Print arbitrary engine text
    ///
    /// ANSI colour sequences (`ESC ... m`) are stripped, and text longer
    /// than the slot is split into consecutive pushes at character
    /// boundaries. Stops at the first push that fails.
    pub async fn print(&self, text: &str) -> Result<(), EmitError> {
        let mut chunk = BoundedText::<N>::new();
        let mut in_escape = false;

        for c in text.chars() {
            if c == '\u{1b}' {
                in_escape = true;
                continue;
            }
            if in_escape {
                if c == 'm' {
                    in_escape = false;
                }
                continue;
            }

            if chunk.push(c).is_err() {
                self.emit(chunk.as_str()).await?;
                chunk.clear();
                chunk.push(c)?;
            }
        }

        if !chunk.is_empty() {
            self.emit(chunk.as_str()).await?;
        }

        Ok(())
    }

    /// Slot capacity in bytes
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Ack timeout applied to every push
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;
    use proptest::prelude::*;

    const ACK: Duration = Duration::from_millis(50);
    const POLL: Duration = Duration::from_millis(150);

    #[test]
    fn test_emit_then_poll() {
        let channel = OutputChannel::<32>::new();
        block_on(async {
            channel.emit("loaded env X", ACK).await.unwrap();
            let message = channel.poll(POLL).await.unwrap();
            assert_eq!(message.text(), "loaded env X");
            assert!(channel.is_occupied());
        });
    }

    #[test]
    fn test_poll_times_out_when_empty() {
        let channel = OutputChannel::<32>::new();
        block_on(async {
            assert!(channel.poll(Duration::from_millis(20)).await.is_none());
        });
    }

    #[test]
    fn test_second_emit_dropped_without_done() {
        let channel = OutputChannel::<32>::new();
        block_on(async {
            channel.emit("loaded env X", ACK).await.unwrap();
            assert_eq!(channel.poll(POLL).await.unwrap().text(), "loaded env X");

            let result = channel.emit("loaded env Y", ACK).await;
            assert_eq!(result, Err(EmitError::AckTimeout));
            assert_eq!(channel.dropped(), 1);

            // Y never shows up, even after the slot is freed
            channel.done();
            assert!(channel.poll(Duration::from_millis(20)).await.is_none());
        });
    }

    #[test]
    fn test_emit_proceeds_after_done() {
        let channel = OutputChannel::<32>::new();
        block_on(async {
            channel.emit("first", ACK).await.unwrap();

            let producer = channel.emit("second", Duration::from_millis(200));
            let consumer = async {
                let first = channel.poll(POLL).await.unwrap();
                Timer::after_millis(20).await;
                channel.done();
                first
            };

            let (pushed, first) = join(producer, consumer).await;
            assert_eq!(first.text(), "first");
            assert_eq!(pushed, Ok(()));
            assert_eq!(channel.poll(POLL).await.unwrap().text(), "second");
        });
    }

    #[test]
    fn test_repeated_poll_without_new_push() {
        let channel = OutputChannel::<32>::new();
        block_on(async {
            channel.emit("once", ACK).await.unwrap();
            assert!(channel.poll(POLL).await.is_some());
            // Still occupied, but nothing new is pending
            assert!(channel.poll(Duration::from_millis(20)).await.is_none());
        });
    }

    #[test]
    fn test_emit_too_long() {
        let channel = OutputChannel::<4>::new();
        block_on(async {
            let result = channel.emit("too long", ACK).await;
            assert!(matches!(result, Err(EmitError::LengthExceeded(_))));
            assert!(!channel.is_occupied());
        });
    }

    #[test]
    fn test_emit_while_occupied_times_out_under_block_on() {
        // Engine callbacks push through `block_on` rather than an executor task
        let channel = OutputChannel::<8>::new();
        let wait = Duration::from_millis(50);

        assert_eq!(block_on(channel.emit("first", wait)), Ok(()));
        assert_eq!(
            block_on(channel.emit("second", wait)),
            Err(EmitError::AckTimeout)
        );
        assert_eq!(channel.dropped(), 1);

        let message = block_on(channel.poll(POLL)).unwrap();
        assert_eq!(message.text(), "first");
    }

    #[test]
    fn test_clear_message() {
        let channel = OutputChannel::<8>::new();
        block_on(async {
            channel.clear(ACK).await.unwrap();
            assert_eq!(channel.poll(POLL).await, Some(OutputMessage::Clear));
        });
    }

    #[test]
    fn test_print_strips_ansi_and_chunks() {
        let channel = OutputChannel::<4>::new();
        let emitter = channel.emitter(Duration::from_millis(200));
        block_on(async {
            let producer = emitter.print("\u{1b}[32mabcdef\u{1b}[0m!");
            let consumer = async {
                let mut seen = std::string::String::new();
                while let Some(message) = channel.poll(POLL).await {
                    seen.push_str(message.text());
                    seen.push('|');
                    channel.done();
                }
                seen
            };

            let (printed, seen) = join(producer, consumer).await;
            assert_eq!(printed, Ok(()));
            assert_eq!(seen, "abcd|ef!|");
        });
    }

    proptest! {
        #[test]
        fn test_emit_poll_preserves_bytes(text in "[^\u{1b}]{0,64}") {
            let channel = OutputChannel::<256>::new();
            let polled = block_on(async {
                channel.emit(&text, ACK).await.unwrap();
                channel.poll(POLL).await
            });
            let polled = polled.unwrap();
            prop_assert_eq!(polled.text(), text.as_str());
        }
    }
}
