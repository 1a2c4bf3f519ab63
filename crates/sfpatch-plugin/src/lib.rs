//! # sfpatch-plugin
//!
//! SFSE plugin that applies the patch table in [`patches`] to the running
//! game.
//!
//! The loader reads [`SFSEPlugin_Version`], then calls
//! [`SFSEPlugin_Preload`] before the game's static initialization. From
//! there the lifecycle takes over: preload patches are written
//! immediately, postload patches when the loader broadcasts its postload
//! message, and delay-load patches a few seconds later.

mod logging;
pub mod patches;

use std::sync::OnceLock;

use sfpatch::abi::{self, LoaderInterface, Message, PluginVersionData, SfseInterface};
use sfpatch::{CurrentProcess, Lifecycle, LifecycleConfig, MessageBus, MessageOutcome, PatchSet};
use tracing::{debug, error, info};

const PLUGIN_NAME: &str = "sfpatch";
const PLUGIN_AUTHOR: &str = "sfpatch contributors";

type Shim = Lifecycle<PatchSet<CurrentProcess>>;

static SHIM: OnceLock<Shim> = OnceLock::new();

#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
pub static SFSEPlugin_Version: PluginVersionData =
    PluginVersionData::new(PLUGIN_NAME, PLUGIN_AUTHOR)
        .plugin_version(1)
        .compatible_with(&[abi::make_version(1, 7, 29)]);

/// Loader entry point, called once at attach time.
///
/// # Safety
///
/// `sfse` must be null or point to the loader's interface table.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SFSEPlugin_Preload(sfse: *const SfseInterface) {
    logging::init();
    // SAFETY: forwarded from the loader.
    unsafe { preload(sfse) };
}

unsafe fn preload(sfse: *const SfseInterface) {
    // SAFETY: the loader's table outlives the plugin.
    let Some(loader) = (unsafe { LoaderInterface::from_ptr(sfse) }) else {
        error!("Loader passed a null interface; nothing to do");
        return;
    };

    info!(
        "{} v{} attaching (loader {:#x}, runtime {:#x})",
        PLUGIN_NAME,
        env!("CARGO_PKG_VERSION"),
        loader.sfse_version(),
        loader.runtime_version()
    );
    if !SFSEPlugin_Version.is_compatible(loader.runtime_version()) {
        // The loader normally refuses to get this far
        error!("Runtime {:#x} is not in the compatibility list", loader.runtime_version());
    }

    let process = match CurrentProcess::open() {
        Ok(process) => process,
        Err(e) => {
            error!("Cannot access process memory: {}", e);
            return;
        }
    };

    let shim = SHIM.get_or_init(|| {
        Lifecycle::new(patches::patch_set(process), LifecycleConfig::default())
    });

    let bus = loader.message_bus(on_message);
    match shim.attach(bus.as_ref().map(|bus| bus as &dyn MessageBus)) {
        Ok(()) => info!("Attached; waiting for postload"),
        Err(e) if e.is_registration_failure() => {
            error!("{}; postload and delay-load patches will not be applied", e)
        }
        Err(e) => error!("Attach failed: {}", e),
    }
}

unsafe extern "C" fn on_message(message: *mut Message) {
    // SAFETY: the loader keeps the message alive for the duration of the callback.
    let Some(message) = (unsafe { message.as_ref() }) else {
        return;
    };
    let Some(shim) = SHIM.get() else {
        return;
    };

    match shim.handle_message(message.kind) {
        Ok(MessageOutcome::PostLoadRan) => info!(
            "Postload handled; delay-load in {:?}",
            shim.config().delay_load_after
        ),
        Ok(outcome) => debug!("Loader message {} -> {:?}", message.kind, outcome),
        Err(e) => error!("Postload handling failed: {}", e),
    }
}
