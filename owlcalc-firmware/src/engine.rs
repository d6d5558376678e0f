//! Bridge to the precompiled expression engine
//!
//! The engine is a static library with a C ABI. It runs its own runtime
//! (started with `gorun`) and calls back into the firmware to print text,
//! clear the screen and access environment storage. Those callbacks are
//! plain `extern "C"` functions, so the hooks handed over at startup are
//! parked in statics for them to reach.
//!
//! Callbacks only ever run on the compute task, inside `HexowlCalculate`.

use core::cell::Cell;
use core::future::Future;
use core::slice;

use defmt::*;
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;

use owlcalc_core::config::{INPUT_LEN, MESSAGE_LEN};
use owlcalc_core::{
    utf8_prefix, Computation, Emitter, Engine, EngineHooks, EngineInitError, LazyStorage,
};
use owlcalc_hal::{EnvStorage, OpenMode, StorageStatus};

use crate::storage::FlashEnvStorage;

/// Storage handed to the engine
pub type EngineStorage = LazyStorage<&'static mut FlashEnvStorage>;

/// Size of the buffer the engine passes to the list callback
const LIST_LEN: usize = 512;

/// String as passed across the engine boundary
#[repr(C)]
#[derive(Clone, Copy)]
struct GoString {
    p: *const u8,
    n: usize,
}

impl GoString {
    /// View the engine string as `&str`
    ///
    /// The engine chunks long prints by bytes, so a multi-byte character
    /// can straddle two strings. Only the valid UTF-8 part is returned.
    ///
    /// # Safety
    /// `p` must point at `n` readable bytes that stay alive for `'a`.
    unsafe fn as_str<'a>(self) -> &'a str {
        if self.p.is_null() || self.n == 0 {
            return "";
        }
        let bytes = slice::from_raw_parts(self.p, self.n);
        let text = utf8_prefix(bytes);
        if text.len() < bytes.len() {
            debug!("Dropped {} bytes of non UTF-8 engine text", bytes.len() - text.len());
        }
        text
    }
}

/// Return value of `HexowlCalculate`
#[repr(C)]
struct CalculateReturn {
    success: u8,
    dec_val: GoString,
    hex_val: GoString,
    bin_val: GoString,
    calc_time: u32,
}

type PrintFn = extern "C" fn(GoString);
type ClearFn = extern "C" fn();
type ListFn = extern "C" fn(*mut u8) -> i32;
type OpenFn = extern "C" fn(GoString, GoString) -> i32;
type CloseFn = extern "C" fn() -> i32;
type WriteFn = extern "C" fn(*const u8, usize) -> i32;
type ReadFn = extern "C" fn(*mut u8, usize) -> i32;

extern "C" {
    fn gorun(heap_size: usize);

    #[allow(clippy::too_many_arguments)]
    fn HexowlInit(
        print: PrintFn,
        limit: u32,
        clear: ClearFn,
        list: ListFn,
        open: OpenFn,
        close: CloseFn,
        write: WriteFn,
        read: ReadFn,
    );

    fn HexowlCalculate(input: *const u8) -> CalculateReturn;

    fn GetFreeMem() -> u64;
}

/// Output handle used by the print and clear callbacks
static EMITTER: BlockingMutex<CriticalSectionRawMutex, Cell<Option<Emitter<'static, MESSAGE_LEN>>>> =
    BlockingMutex::new(Cell::new(None));

/// Storage used by the file callbacks
static STORAGE: Mutex<CriticalSectionRawMutex, Option<EngineStorage>> = Mutex::new(None);

/// Handle to the initialized engine
///
/// There is one engine runtime per firmware image; `init` fails if called
/// twice.
pub struct HexowlEngine {
    input: [u8; INPUT_LEN + 1],
}

impl HexowlEngine {
    /// Start the engine runtime and register the callbacks
    pub fn init(
        hooks: EngineHooks<'static, MESSAGE_LEN, EngineStorage>,
        heap_size: usize,
    ) -> Result<Self, EngineInitError> {
        let Ok(mut storage) = STORAGE.try_lock() else {
            return Err(EngineInitError::RuntimeStart);
        };
        if storage.is_some() {
            error!("Engine already initialized");
            return Err(EngineInitError::RuntimeStart);
        }
        *storage = Some(hooks.storage);
        drop(storage);

        EMITTER.lock(|emitter| emitter.set(Some(hooks.emitter)));

        info!("Starting engine runtime ({} byte heap)", heap_size);
        // SAFETY: called once, before any other engine entry point
        unsafe { gorun(heap_size) };

        // SAFETY: the runtime is running
        let free = unsafe { GetFreeMem() };
        if free == 0 {
            return Err(EngineInitError::OutOfMemory);
        }
        debug!("Engine heap free: {} bytes", free);

        // SAFETY: the callbacks match the engine's C signatures
        unsafe {
            HexowlInit(
                print_callback,
                hooks.output_capacity as u32,
                clear_callback,
                list_callback,
                open_callback,
                close_callback,
                write_callback,
                read_callback,
            )
        };

        Ok(Self {
            input: [0; INPUT_LEN + 1],
        })
    }
}

impl Engine for HexowlEngine {
    fn compute<'a>(&'a mut self, expression: &'a str) -> impl Future<Output = Computation<'a>> + 'a {
        async move {
            let len = expression.len().min(INPUT_LEN);
            self.input[..len].copy_from_slice(&expression.as_bytes()[..len]);
            self.input[len] = 0;

            // SAFETY: input is NUL-terminated. The returned strings live on
            // the engine's non-moving heap until the next call, which needs
            // `&mut self` and so cannot overlap with this borrow.
            unsafe {
                let ret = HexowlCalculate(self.input.as_ptr());
                if ret.success == 0 {
                    Computation::error(ret.dec_val.as_str(), ret.calc_time)
                } else {
                    Computation::value(
                        ret.dec_val.as_str(),
                        ret.hex_val.as_str(),
                        ret.bin_val.as_str(),
                        ret.calc_time,
                    )
                }
            }
        }
    }
}

fn emitter() -> Option<Emitter<'static, MESSAGE_LEN>> {
    EMITTER.lock(|emitter| emitter.get())
}

fn with_storage(f: impl FnOnce(&mut EngineStorage) -> i32) -> i32 {
    let mut storage = block_on(STORAGE.lock());
    match storage.as_mut() {
        Some(storage) => f(storage),
        None => StorageStatus::NotImplemented.code(),
    }
}

extern "C" fn print_callback(text: GoString) {
    let Some(emitter) = emitter() else {
        return;
    };
    // SAFETY: the engine keeps `text` alive for the duration of the call
    let text = unsafe { text.as_str() };
    if let Err(e) = block_on(emitter.print(text)) {
        debug!("Engine print dropped: {:?}", e);
    }
}

extern "C" fn clear_callback() {
    if let Some(emitter) = emitter() {
        if let Err(e) = block_on(emitter.clear()) {
            debug!("Engine clear dropped: {:?}", e);
        }
    }
}

extern "C" fn list_callback(out: *mut u8) -> i32 {
    if out.is_null() {
        return StorageStatus::ReadFail.code();
    }
    // SAFETY: the engine passes a buffer of at least LIST_LEN bytes
    let out = unsafe { slice::from_raw_parts_mut(out, LIST_LEN) };
    with_storage(|storage| {
        // Leave room for the terminating NUL
        let n = storage.list(&mut out[..LIST_LEN - 1]);
        out[n.max(0) as usize] = 0;
        n
    })
}

extern "C" fn open_callback(name: GoString, mode: GoString) -> i32 {
    // SAFETY: both strings are alive for the duration of the call
    let (name, mode) = unsafe { (name.as_str(), mode.as_str()) };
    let Some(mode) = OpenMode::from_mode_str(mode) else {
        warn!("Unsupported open mode '{}'", mode);
        return StorageStatus::NotImplemented.code();
    };
    with_storage(|storage| storage.open(name, mode))
}

extern "C" fn close_callback() -> i32 {
    with_storage(|storage| storage.close())
}

extern "C" fn write_callback(data: *const u8, size: usize) -> i32 {
    if data.is_null() {
        return StorageStatus::WriteFail.code();
    }
    // SAFETY: the engine passes `size` readable bytes
    let data = unsafe { slice::from_raw_parts(data, size) };
    with_storage(|storage| storage.write(data))
}

extern "C" fn read_callback(data: *mut u8, size: usize) -> i32 {
    if data.is_null() {
        return StorageStatus::ReadFail.code();
    }
    // SAFETY: the engine passes `size` writable bytes
    let data = unsafe { slice::from_raw_parts_mut(data, size) };
    with_storage(|storage| storage.read(data))
}
