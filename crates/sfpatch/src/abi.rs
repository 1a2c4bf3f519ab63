//! Plugin loader ABI.
//!
//! `#[repr(C)]` mirrors of the records the SFSE loader exchanges with a
//! plugin, plus thin safe wrappers over the function tables it hands out.
//! Field order and widths must match the loader exactly.

use std::ffi::{CStr, CString, c_char, c_void};

use tracing::debug;

use crate::lifecycle::MessageBus;

pub type PluginHandle = u32;

/// Name the loader uses as the sender of its own messages
pub const LOADER_NAME: &str = "SFSE";

/// `QueryInterface` id of the messaging interface
pub const MESSAGING_INTERFACE_ID: u32 = 1;

/// Message broadcast once after the host's static initialization
pub const MESSAGE_POST_LOAD: u32 = 0;

/// Version of the [`PluginVersionData`] layout
pub const PLUGIN_API_VERSION: u32 = 1;

/// The plugin locates game code by signature, not by hard-coded address
pub const ADDRESS_INDEPENDENCE_SIGNATURES: u32 = 1;

/// The plugin does not depend on game structure layouts
pub const STRUCTURE_INDEPENDENCE_NO_STRUCTS: u32 = 1;

const NAME_LEN: usize = 256;
const MAX_COMPATIBLE_VERSIONS: usize = 16;

/// Pack a version triple the way the loader compares runtime versions
pub const fn make_version(major: u32, minor: u32, build: u32) -> u32 {
    ((major & 0xFF) << 24) | ((minor & 0xFF) << 16) | ((build & 0xFFF) << 4)
}

/// Copy `s` into a NUL-padded fixed buffer, truncating to leave the terminator
pub const fn fixed_str<const N: usize>(s: &str) -> [c_char; N] {
    let bytes = s.as_bytes();
    let mut out = [0 as c_char; N];
    let mut i = 0;
    while i < bytes.len() && i + 1 < N {
        out[i] = bytes[i] as c_char;
        i += 1;
    }
    out
}

/// Version record the loader reads from the exported `SFSEPlugin_Version`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginVersionData {
    pub data_version: u32,
    pub plugin_version: u32,
    pub name: [c_char; NAME_LEN],
    pub author: [c_char; NAME_LEN],
    pub address_independence: u32,
    pub structure_independence: u32,
    /// Zero-terminated list of compatible runtime versions
    pub compatible_versions: [u32; MAX_COMPATIBLE_VERSIONS],
    pub se_version_required: u32,
    pub reserved_non_breaking: u32,
    pub reserved_breaking: u32,
}

impl PluginVersionData {
    pub const fn new(name: &str, author: &str) -> Self {
        Self {
            data_version: PLUGIN_API_VERSION,
            plugin_version: 1,
            name: fixed_str(name),
            author: fixed_str(author),
            address_independence: ADDRESS_INDEPENDENCE_SIGNATURES,
            structure_independence: STRUCTURE_INDEPENDENCE_NO_STRUCTS,
            compatible_versions: [0; MAX_COMPATIBLE_VERSIONS],
            se_version_required: 0,
            reserved_non_breaking: 0,
            reserved_breaking: 0,
        }
    }

    pub const fn plugin_version(mut self, version: u32) -> Self {
        self.plugin_version = version;
        self
    }

    /// Runtime versions this plugin supports; at most 15 are kept so the
    /// list stays zero-terminated
    pub const fn compatible_with(mut self, versions: &[u32]) -> Self {
        let mut i = 0;
        while i < versions.len() && i + 1 < MAX_COMPATIBLE_VERSIONS {
            self.compatible_versions[i] = versions[i];
            i += 1;
        }
        self
    }

    /// Minimum loader version, 0 for any
    pub const fn requires_loader(mut self, version: u32) -> Self {
        self.se_version_required = version;
        self
    }

    pub fn name(&self) -> String {
        c_chars_to_string(&self.name)
    }

    pub fn author(&self) -> String {
        c_chars_to_string(&self.author)
    }

    pub fn is_compatible(&self, runtime_version: u32) -> bool {
        self.compatible_versions
            .iter()
            .take_while(|&&v| v != 0)
            .any(|&v| v == runtime_version)
    }
}

fn c_chars_to_string(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[repr(C)]
#[derive(Debug)]
pub struct PluginInfo {
    pub info_version: u32,
    pub name: *const c_char,
    pub version: u32,
}

/// Interface table passed to `SFSEPlugin_Preload`
#[repr(C)]
pub struct SfseInterface {
    pub sfse_version: u32,
    pub runtime_version: u32,
    pub interface_version: u32,
    pub query_interface: Option<unsafe extern "C" fn(id: u32) -> *mut c_void>,
    pub get_plugin_handle: Option<unsafe extern "C" fn() -> PluginHandle>,
    pub get_plugin_info: Option<unsafe extern "C" fn(name: *const c_char) -> *const PluginInfo>,
}

/// Message delivered to a registered listener
#[repr(C)]
#[derive(Debug)]
pub struct Message {
    pub sender: *const c_char,
    pub kind: u32,
    pub data_len: u32,
    pub data: *mut c_void,
}

impl Message {
    /// Sender name, if present.
    ///
    /// # Safety
    ///
    /// `sender` must be null or point to a NUL-terminated string that
    /// outlives the returned reference.
    pub unsafe fn sender(&self) -> Option<&CStr> {
        if self.sender.is_null() {
            None
        } else {
            // SAFETY: upheld by the caller.
            Some(unsafe { CStr::from_ptr(self.sender) })
        }
    }
}

pub type MessageCallback = unsafe extern "C" fn(message: *mut Message);

#[repr(C)]
pub struct MessagingInterface {
    pub interface_version: u32,
    pub register_listener: Option<
        unsafe extern "C" fn(
            listener: PluginHandle,
            sender: *const c_char,
            handler: Option<MessageCallback>,
        ) -> bool,
    >,
    pub dispatch: Option<
        unsafe extern "C" fn(
            sender: PluginHandle,
            message_type: u32,
            data: *mut c_void,
            data_len: u32,
            receiver: *const c_char,
        ) -> bool,
    >,
}

/// Borrowed view of the loader's interface table
#[derive(Clone, Copy)]
pub struct LoaderInterface<'a> {
    raw: &'a SfseInterface,
}

impl<'a> LoaderInterface<'a> {
    /// Wrap the pointer the loader passed to the plugin entry point.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a valid [`SfseInterface`] whose
    /// function pointers stay callable for `'a`.
    pub unsafe fn from_ptr(ptr: *const SfseInterface) -> Option<Self> {
        // SAFETY: upheld by the caller.
        unsafe { ptr.as_ref() }.map(|raw| Self { raw })
    }

    pub fn sfse_version(&self) -> u32 {
        self.raw.sfse_version
    }

    pub fn runtime_version(&self) -> u32 {
        self.raw.runtime_version
    }

    pub fn plugin_handle(&self) -> Option<PluginHandle> {
        let get_handle = self.raw.get_plugin_handle?;
        // SAFETY: loader-provided function with no arguments.
        Some(unsafe { get_handle() })
    }

    /// The messaging interface, if the loader provides one
    pub fn messaging(&self) -> Option<&'a MessagingInterface> {
        let query = self.raw.query_interface?;
        // SAFETY: the loader returns null or a pointer to a static interface table.
        let ptr = unsafe { query(MESSAGING_INTERFACE_ID) } as *const MessagingInterface;
        // SAFETY: non-null results stay valid for the loader's lifetime.
        unsafe { ptr.as_ref() }
    }

    /// Message bus that registers `callback` under this plugin's handle
    pub fn message_bus(&self, callback: MessageCallback) -> Option<LoaderMessaging<'a>> {
        Some(LoaderMessaging {
            iface: self.messaging()?,
            handle: self.plugin_handle()?,
            callback,
        })
    }
}

/// [`MessageBus`] backed by the loader's `RegisterListener`
pub struct LoaderMessaging<'a> {
    iface: &'a MessagingInterface,
    handle: PluginHandle,
    callback: MessageCallback,
}

impl MessageBus for LoaderMessaging<'_> {
    fn register_listener(&self, sender: &str) -> bool {
        let Some(register) = self.iface.register_listener else {
            debug!("Messaging interface has no RegisterListener");
            return false;
        };
        let Ok(sender) = CString::new(sender) else {
            return false;
        };
        // SAFETY: sender is NUL-terminated and alive for the duration of the call.
        unsafe { register(self.handle, sender.as_ptr(), Some(self.callback)) }
    }
}
