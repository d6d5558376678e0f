//! Request/response mailbox
//!
//! A caller acquires request ownership, writes the expression and signals
//! the compute task. The compute task answers through the response slot
//! and the completion signal, which carries the sequence number of the
//! request it answers.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embassy_time::{with_deadline, with_timeout, Duration, Instant};

use crate::buffer::{BoundedText, LengthExceeded};
use crate::log::{debug, error, warn};

/// Errors seen by a caller of the compute protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallError {
    /// Request ownership was not acquired in time (busy)
    LockTimeout,
    /// Completion was not signaled in time
    ResultTimeout,
    /// Expression does not fit the request buffer
    LengthExceeded(LengthExceeded),
}

impl From<LengthExceeded> for CallError {
    fn from(e: LengthExceeded) -> Self {
        CallError::LengthExceeded(e)
    }
}

/// Request as seen by the compute task
#[derive(Debug, Clone)]
pub struct Request<const IN: usize> {
    seq: u32,
    text: BoundedText<IN>,
}

impl<const IN: usize> Request<IN> {
    /// Sequence number identifying this submission
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Expression text
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

/// Formatted result as seen by the caller
#[derive(Debug, Clone)]
pub struct Response<const OUT: usize> {
    text: BoundedText<OUT>,
    elapsed_ms: u32,
}

impl<const OUT: usize> Response<OUT> {
    /// Formatted, possibly multi-line result text
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    /// Computation time reported by the engine
    pub fn elapsed_ms(&self) -> u32 {
        self.elapsed_ms
    }

    /// Take the text buffer
    pub fn into_text(self) -> BoundedText<OUT> {
        self.text
    }
}

struct RequestSlot<const IN: usize> {
    seq: u32,
    text: BoundedText<IN>,
}

struct ResponseSlot<const OUT: usize> {
    seq: u32,
    text: BoundedText<OUT>,
    elapsed_ms: u32,
}

/// Single-slot request/response mailbox
///
/// Designed to live in a `static` and be shared by reference between the
/// callers and the compute task.
pub struct CalcChannel<const IN: usize, const OUT: usize> {
    /// Request ownership; held by a [`PendingCall`]
    ownership: Mutex<CriticalSectionRawMutex, ()>,
    request: BlockingMutex<CriticalSectionRawMutex, RefCell<RequestSlot<IN>>>,
    response: BlockingMutex<CriticalSectionRawMutex, RefCell<ResponseSlot<OUT>>>,
    /// "Request submitted"
    submitted: Signal<CriticalSectionRawMutex, ()>,
    /// "Computation complete", carrying the answered sequence number
    completed: Signal<CriticalSectionRawMutex, u32>,
}

impl<const IN: usize, const OUT: usize> Default for CalcChannel<IN, OUT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const IN: usize, const OUT: usize> CalcChannel<IN, OUT> {
    /// Create an idle channel
    pub const fn new() -> Self {
        Self {
            ownership: Mutex::new(()),
            request: BlockingMutex::new(RefCell::new(RequestSlot {
                seq: 0,
                text: BoundedText::new(),
            })),
            response: BlockingMutex::new(RefCell::new(ResponseSlot {
                seq: 0,
                text: BoundedText::new(),
                elapsed_ms: 0,
            })),
            submitted: Signal::new(),
            completed: Signal::new(),
        }
    }

    /// Submit an expression to the compute task
    ///
    /// Waits up to `lock_timeout` for request ownership. Oversized
    /// expressions fail before any waiting, and a busy channel fails with
    /// [`CallError::LockTimeout`]; neither changes any state.
    pub async fn submit(
        &self,
        expression: &str,
        lock_timeout: Duration,
    ) -> Result<PendingCall<'_, IN, OUT>, CallError> {
        if expression.len() > IN {
            warn!("expression too long: {} > {} bytes", expression.len(), IN);
            return Err(LengthExceeded {
                capacity: IN,
                len: expression.len(),
            }
            .into());
        }

        let ownership = match with_timeout(lock_timeout, self.ownership.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("request lock timeout");
                return Err(CallError::LockTimeout);
            }
        };

        let seq = self.request.lock(|slot| {
            let mut slot = slot.borrow_mut();
            slot.text.set(expression)?;
            slot.seq = slot.seq.wrapping_add(1);
            Ok::<_, LengthExceeded>(slot.seq)
        })?;

        debug!("request {} submitted", seq);
        self.submitted.signal(());

        Ok(PendingCall {
            channel: self,
            seq,
            _ownership: ownership,
        })
    }

    /// Submit an expression and wait for its result
    pub async fn call(
        &self,
        expression: &str,
        lock_timeout: Duration,
        result_timeout: Duration,
    ) -> Result<Response<OUT>, CallError> {
        self.submit(expression, lock_timeout)
            .await?
            .await_result(result_timeout)
            .await
    }

    /// Wait for the next submitted request (compute task side)
    ///
    /// Blocks indefinitely. The request is copied out, so callers may
    /// submit again as soon as they own the channel.
    pub async fn wait_request(&self) -> Request<IN> {
        self.submitted.wait().await;
        self.request.lock(|slot| {
            let slot = slot.borrow();
            Request {
                seq: slot.seq,
                text: slot.text.clone(),
            }
        })
    }

    /// Publish the response to request `seq` and signal completion
    /// (compute task side)
    pub fn complete(&self, seq: u32, text: &BoundedText<OUT>, elapsed_ms: u32) {
        self.response.lock(|slot| {
            let mut slot = slot.borrow_mut();
            slot.seq = seq;
            slot.text.clone_from(text);
            slot.elapsed_ms = elapsed_ms;
        });
        self.completed.signal(seq);
    }

    /// Check if a caller currently owns the channel
    pub fn is_busy(&self) -> bool {
        self.ownership.try_lock().is_err()
    }

    fn read_response(&self, seq: u32) -> Option<Response<OUT>> {
        self.response.lock(|slot| {
            let slot = slot.borrow();
            (slot.seq == seq).then(|| Response {
                text: slot.text.clone(),
                elapsed_ms: slot.elapsed_ms,
            })
        })
    }
}

/// A submitted request whose result has not been collected yet
///
/// Holds request ownership. Collecting the result with
/// [`await_result`](PendingCall::await_result) or dropping the call
/// releases it. Completions of abandoned calls are recognised by their
/// sequence number and never returned to a later caller.
pub struct PendingCall<'a, const IN: usize, const OUT: usize> {
    channel: &'a CalcChannel<IN, OUT>,
    seq: u32,
    _ownership: MutexGuard<'a, CriticalSectionRawMutex, ()>,
}

impl<const IN: usize, const OUT: usize> PendingCall<'_, IN, OUT> {
    /// Sequence number of this submission
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Wait up to `timeout` for the result and release ownership
    pub async fn await_result(self, timeout: Duration) -> Result<Response<OUT>, CallError> {
        let deadline = Instant::now() + timeout;

        loop {
            match with_deadline(deadline, self.channel.completed.wait()).await {
                Ok(seq) if seq == self.seq => {
                    if let Some(response) = self.channel.read_response(seq) {
                        return Ok(response);
                    }
                }
                Ok(stale) => {
                    debug!("discarding stale completion {} (want {})", stale, self.seq);
                }
                Err(_) => {
                    error!("expression calculation timeout (request {})", self.seq);
                    return Err(CallError::ResultTimeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;

    type Channel = CalcChannel<16, 64>;

    const LOCK: Duration = Duration::from_millis(50);
    const RESULT: Duration = Duration::from_millis(500);

    /// Answer one request with its expression echoed back
    async fn echo_once(channel: &Channel) -> u32 {
        let request = channel.wait_request().await;
        let mut text = BoundedText::new();
        text.set(request.as_str()).unwrap();
        channel.complete(request.seq(), &text, 1);
        request.seq()
    }

    #[test]
    fn test_call_roundtrip() {
        let channel = Channel::new();
        block_on(async {
            let (result, _) = join(channel.call("1+1", LOCK, RESULT), echo_once(&channel)).await;
            let response = result.unwrap();
            assert_eq!(response.as_str(), "1+1");
            assert_eq!(response.elapsed_ms(), 1);
        });
        assert!(!channel.is_busy());
    }

    #[test]
    fn test_oversized_expression_fails_fast() {
        let channel = Channel::new();
        block_on(async {
            let long = "1+1+1+1+1+1+1+1+1";
            let err = channel.submit(long, LOCK).await.err();
            assert_eq!(
                err,
                Some(CallError::LengthExceeded(LengthExceeded {
                    capacity: 16,
                    len: long.len(),
                }))
            );
        });
        assert!(!channel.is_busy());
        assert!(!channel.submitted.signaled());
    }

    #[test]
    fn test_second_submit_is_busy() {
        let channel = Channel::new();
        block_on(async {
            let first = channel.submit("2+2", LOCK).await.unwrap();
            assert!(channel.is_busy());
            let second = channel.submit("3+3", LOCK).await;
            assert_eq!(second.err(), Some(CallError::LockTimeout));
            // The unread request is untouched
            assert_eq!(channel.wait_request().await.as_str(), "2+2");
            drop(first);
        });
    }

    #[test]
    fn test_result_timeout_releases_ownership() {
        let channel = Channel::new();
        block_on(async {
            let pending = channel.submit("2+2", LOCK).await.unwrap();
            let result = pending.await_result(Duration::from_millis(20)).await;
            assert_eq!(result.err(), Some(CallError::ResultTimeout));
            assert!(!channel.is_busy());
        });
    }

    #[test]
    fn test_abandoned_call_result_not_delivered_to_next_caller() {
        let channel = Channel::new();
        block_on(async {
            // Submit and abandon without collecting
            drop(channel.submit("old", LOCK).await.unwrap());

            let compute = async {
                // Slow answer to the abandoned request arrives first
                let stale = channel.wait_request().await;
                Timer::after_millis(20).await;
                let mut text = BoundedText::new();
                text.set("stale").unwrap();
                channel.complete(stale.seq(), &text, 0);
                echo_once(&channel).await
            };
            let caller = async {
                // Submits while the abandoned request is still computing
                Timer::after_millis(5).await;
                channel.call("new", LOCK, RESULT).await
            };

            let (_, result) = join(compute, caller).await;
            assert_eq!(result.unwrap().as_str(), "new");
        });
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let channel = Channel::new();
        block_on(async {
            let first = channel.submit("a", LOCK).await.unwrap().seq();
            let second = channel.submit("b", LOCK).await.unwrap().seq();
            assert_eq!(second, first + 1);
        });
    }
}
