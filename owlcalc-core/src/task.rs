//! Compute task
//!
//! Owns the engine and the power coordinator, serves requests from the
//! [`CalcChannel`] one at a time, and hands the engine its output and
//! storage hooks at startup.
//!
//! Startup is fail-stop: if the performance lock or the engine cannot be
//! initialized, [`ComputeTask::start`] returns an error and no request is
//! ever served.

use owlcalc_hal::{EnvStorage, PowerControl, PowerError};

use crate::buffer::BoundedText;
use crate::config::CalcConfig;
use crate::engine::{format_response, Engine, EngineHooks, EngineInitError};
use crate::log::{debug, error, info, warn};
use crate::power::PowerCoordinator;
use crate::protocol::{CalcChannel, OutputChannel};
use crate::storage::LazyStorage;

/// Fatal compute task startup errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupError {
    /// The performance lock could not be created
    PowerLock(PowerError),
    /// The engine failed to initialize
    Engine(EngineInitError),
}

impl From<PowerError> for StartupError {
    fn from(e: PowerError) -> Self {
        StartupError::PowerLock(e)
    }
}

impl From<EngineInitError> for StartupError {
    fn from(e: EngineInitError) -> Self {
        StartupError::Engine(e)
    }
}

/// The compute side of the protocol
pub struct ComputeTask<'a, E, P, const IN: usize, const OUT: usize>
where
    E: Engine,
    P: PowerControl,
{
    channel: &'a CalcChannel<IN, OUT>,
    engine: E,
    power: PowerCoordinator<P>,
    response: BoundedText<OUT>,
    last_seq: Option<u32>,
    served: u32,
}

impl<'a, E, P, const IN: usize, const OUT: usize> ComputeTask<'a, E, P, IN, OUT>
where
    E: Engine,
    P: PowerControl,
{
    /// Initialize the compute task
    ///
    /// Creates the performance lock, runs engine initialization at the
    /// warm-up clock floor, then raises the floor to the ready level.
    /// `init` receives the engine hooks: the output emitter, the output
    /// capacity and (lazily mounted) environment storage.
    pub fn start<S, F, const N: usize>(
        channel: &'a CalcChannel<IN, OUT>,
        output: &'a OutputChannel<N>,
        power: P,
        storage: S,
        config: &CalcConfig,
        init: F,
    ) -> Result<Self, StartupError>
    where
        S: EnvStorage,
        F: FnOnce(EngineHooks<'a, N, LazyStorage<S>>) -> Result<E, EngineInitError>,
    {
        let mut power = PowerCoordinator::new(power)?;
        power.set_clock_floor(config.warmup_clock);

        let storage = if config.storage_enabled {
            LazyStorage::new(storage)
        } else {
            LazyStorage::disabled(storage)
        };

        let hooks = EngineHooks {
            emitter: output.emitter(config.ack_timeout()),
            output_capacity: N,
            storage,
        };

        let engine = match init(hooks) {
            Ok(engine) => engine,
            Err(e) => {
                error!("engine initialization failed: {:?}", e);
                return Err(e.into());
            }
        };

        power.set_clock_floor(config.ready_clock);
        info!("compute task initialized");

        Ok(Self {
            channel,
            engine,
            power,
            response: BoundedText::new(),
            last_seq: None,
            served: 0,
        })
    }

    /// Serve requests forever
    pub async fn run(&mut self) {
        loop {
            self.serve_one().await;
        }
    }

    /// Wait for one request, compute it and publish the response
    ///
    /// Returns the sequence number of the request that was answered.
    pub async fn serve_one(&mut self) -> u32 {
        let request = loop {
            let request = self.channel.wait_request().await;
            if self.last_seq != Some(request.seq()) {
                break request;
            }
            debug!("request {} already served", request.seq());
        };

        let computation = {
            let _lock = self.power.lock();
            self.engine.compute(request.as_str()).await
        };

        debug!(
            "request {} computed in {} ms (success={})",
            request.seq(),
            computation.elapsed_ms,
            computation.is_success()
        );

        if let Err(e) = format_response(&computation, &mut self.response) {
            warn!("response too long: {} > {} bytes", e.len, e.capacity);
        }

        self.channel
            .complete(request.seq(), &self.response, computation.elapsed_ms);

        self.last_seq = Some(request.seq());
        self.served = self.served.wrapping_add(1);
        request.seq()
    }

    /// Number of requests answered
    pub fn served(&self) -> u32 {
        self.served
    }

    /// Borrow the power coordinator
    pub fn power(&self) -> &PowerCoordinator<P> {
        &self.power
    }

    /// Borrow the engine
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::future::Future;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_futures::select::{select, Either};
    use embassy_time::{Duration, Timer};
    use owlcalc_hal::{ClockLevel, NoStorage, OpenMode, StorageStatus};

    use crate::engine::Computation;
    use crate::protocol::{CallError, Emitter};

    const IN: usize = 64;
    const OUT: usize = 128;
    const MSG: usize = 32;

    type Channel = CalcChannel<IN, OUT>;
    type Output = OutputChannel<MSG>;

    const LOCK: Duration = Duration::from_millis(50);
    const RESULT: Duration = Duration::from_millis(1000);
    const POLL: Duration = Duration::from_millis(150);

    /// Tiny deterministic engine understanding a handful of expressions
    struct ScriptEngine<'a> {
        emitter: Emitter<'a, MSG>,
        storage: LazyStorage<NoStorage>,
        delay: Duration,
        calls: u32,
        status: i32,
    }

    impl Engine for ScriptEngine<'_> {
        fn compute<'a>(
            &'a mut self,
            expression: &'a str,
        ) -> impl Future<Output = Computation<'a>> + 'a {
            async move {
                self.calls += 1;
                Timer::after(self.delay).await;
                match expression {
                    "1+1" => Computation::value("2", "", "", 1),
                    "2+2" => Computation::value("4", "0x4", "0b100", 1),
                    "load X" => {
                        let _ = self.emitter.emit("loaded env X").await;
                        Computation::value("", "", "", 2)
                    }
                    "save X" => {
                        self.status = self.storage.open("X", OpenMode::Write);
                        match StorageStatus::from_code(self.status) {
                            Some(StorageStatus::Ok) | None => Computation::value("", "", "", 0),
                            Some(status) => Computation::error(status.description(), 0),
                        }
                    }
                    "echo" => Computation::value(expression, "", "", 0),
                    _ => Computation::error("unexpected token", 0),
                }
            }
        }
    }

    /// Power capability counting acquire/release pairs
    #[derive(Default)]
    struct CountingPower {
        fail: bool,
        acquired: u32,
        released: u32,
        floors: std::vec::Vec<ClockLevel>,
    }

    impl PowerControl for CountingPower {
        fn create_lock(&mut self) -> Result<(), PowerError> {
            if self.fail {
                Err(PowerError::LockUnavailable)
            } else {
                Ok(())
            }
        }

        fn acquire_max_performance(&mut self) {
            self.acquired += 1;
        }

        fn release(&mut self) {
            self.released += 1;
        }

        fn set_clock_floor(&mut self, level: ClockLevel) {
            self.floors.push(level);
        }
    }

    fn start<'a>(
        channel: &'a Channel,
        output: &'a Output,
        delay: Duration,
    ) -> ComputeTask<'a, ScriptEngine<'a>, CountingPower, IN, OUT> {
        ComputeTask::start(
            channel,
            output,
            CountingPower::default(),
            NoStorage,
            &CalcConfig::default(),
            |hooks| {
                Ok(ScriptEngine {
                    emitter: hooks.emitter,
                    storage: hooks.storage,
                    delay,
                    calls: 0,
                    status: 0,
                })
            },
        )
        .unwrap()
    }

    /// Run `callers` against a serving compute task
    fn with_task<'a, T>(
        task: &mut ComputeTask<'a, ScriptEngine<'a>, CountingPower, IN, OUT>,
        callers: impl Future<Output = T>,
    ) -> T {
        block_on(async {
            match select(task.run(), callers).await {
                Either::First(()) => unreachable!("compute loop returned"),
                Either::Second(result) => result,
            }
        })
    }

    #[test]
    fn test_decimal_only_result() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        let response = with_task(&mut task, channel.call("1+1", LOCK, RESULT)).unwrap();
        assert_eq!(response.as_str(), "<: 2\n");
        assert_eq!(response.elapsed_ms(), 1);
    }

    #[test]
    fn test_engine_error_is_data() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        let response = with_task(&mut task, channel.call("bad(", LOCK, RESULT)).unwrap();
        assert!(response.as_str().starts_with("<: error:"));
        assert!(!channel.is_busy());
    }

    #[test]
    fn test_repeated_calls_are_deterministic() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        let responses = with_task(&mut task, async {
            let mut all = std::vec::Vec::new();
            for _ in 0..3 {
                let response = channel.call("2+2", LOCK, RESULT).await.unwrap();
                all.push(std::string::String::from(response.as_str()));
            }
            all
        });

        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|r| r == "<: 4\n   0x4\n   0b100\n"));
        assert_eq!(task.served(), 3);
    }

    #[test]
    fn test_concurrent_submit_one_busy() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_millis(300));

        let (first, second) = with_task(
            &mut task,
            join(channel.call("2+2", LOCK, RESULT), async {
                // Let the first caller take ownership
                Timer::after_millis(5).await;
                channel.call("1+1", LOCK, RESULT).await
            }),
        );

        assert_eq!(first.unwrap().as_str(), "<: 4\n   0x4\n   0b100\n");
        assert_eq!(second.err(), Some(CallError::LockTimeout));
        assert_eq!(task.engine().calls, 1);
    }

    #[test]
    fn test_power_lock_paired_per_computation() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        with_task(&mut task, async {
            channel.call("1+1", LOCK, RESULT).await.unwrap();
            channel.call("bad(", LOCK, RESULT).await.unwrap();
            channel.call("2+2", LOCK, RESULT).await.unwrap();
        });

        let power = task.power();
        assert!(!power.is_held());
        assert_eq!(power.acquisitions(), 3);
        assert_eq!(power.releases(), 3);
        assert_eq!(power.control().acquired, 3);
        assert_eq!(power.control().released, 3);
    }

    #[test]
    fn test_lock_not_held_while_idle() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        with_task(&mut task, Timer::after_millis(20));
        assert_eq!(task.power().acquisitions(), 0);
    }

    #[test]
    fn test_clock_floor_raised_after_warmup() {
        let channel = Channel::new();
        let output = Output::new();
        let task = start(&channel, &output, Duration::from_ticks(0));

        assert_eq!(
            task.power().control().floors,
            [ClockLevel::Low, ClockLevel::Max]
        );
    }

    #[test]
    fn test_engine_push_during_call() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        let (response, pushed) = with_task(
            &mut task,
            join(channel.call("load X", LOCK, RESULT), output.poll(POLL)),
        );

        assert_eq!(response.unwrap().as_str(), "\n");
        assert_eq!(pushed.unwrap().text(), "loaded env X");
    }

    #[test]
    fn test_unacknowledged_push_drops_next() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        with_task(&mut task, async {
            channel.call("load X", LOCK, RESULT).await.unwrap();
            assert_eq!(output.poll(POLL).await.unwrap().text(), "loaded env X");

            // No done(): the engine's next push waits out the ack timeout
            channel.call("load X", LOCK, RESULT).await.unwrap();
            assert_eq!(output.dropped(), 1);
            assert!(output.poll(Duration::from_millis(20)).await.is_none());
        });
    }

    #[test]
    fn test_storage_codes_reach_engine_unchanged() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        let response = with_task(&mut task, channel.call("save X", LOCK, RESULT)).unwrap();
        assert_eq!(task.engine().status, -8);
        assert_eq!(response.as_str(), "<: error: not implemented\n");
    }

    #[test]
    fn test_power_lock_failure_is_fatal() {
        let channel = Channel::new();
        let output = Output::new();
        let mut engine_started = false;

        let result = ComputeTask::<ScriptEngine<'_>, _, IN, OUT>::start(
            &channel,
            &output,
            CountingPower {
                fail: true,
                ..Default::default()
            },
            NoStorage,
            &CalcConfig::default(),
            |hooks| {
                engine_started = true;
                Ok(ScriptEngine {
                    emitter: hooks.emitter,
                    storage: hooks.storage,
                    delay: Duration::from_ticks(0),
                    calls: 0,
                    status: 0,
                })
            },
        );

        assert_eq!(
            result.err(),
            Some(StartupError::PowerLock(PowerError::LockUnavailable))
        );
        assert!(!engine_started);
    }

    #[test]
    fn test_engine_init_failure_is_fatal() {
        let channel = Channel::new();
        let output = Output::new();

        let result = ComputeTask::<ScriptEngine<'_>, _, IN, OUT>::start(
            &channel,
            &output,
            CountingPower::default(),
            NoStorage,
            &CalcConfig::default(),
            |_hooks| Err(EngineInitError::OutOfMemory),
        );

        assert_eq!(
            result.err(),
            Some(StartupError::Engine(EngineInitError::OutOfMemory))
        );

        // Nobody serves the channel: callers time out
        let response = block_on(channel.call("1+1", LOCK, Duration::from_millis(20)));
        assert_eq!(response.err(), Some(CallError::ResultTimeout));
    }

    #[test]
    fn test_oversized_expression_never_reaches_engine() {
        let channel = Channel::new();
        let output = Output::new();
        let mut task = start(&channel, &output, Duration::from_ticks(0));

        let long = "9".repeat(IN + 1);
        let result = with_task(&mut task, channel.call(&long, LOCK, RESULT));
        assert!(matches!(result, Err(CallError::LengthExceeded(_))));
        assert_eq!(task.engine().calls, 0);
    }
}
