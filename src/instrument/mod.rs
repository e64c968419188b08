pub mod registry;

pub use registry::{HookFn, HookKind, HookRegistry, InstrumentationScope, SessionId};
