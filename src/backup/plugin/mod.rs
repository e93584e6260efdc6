//! External drivers: discovery from `module.yaml` manifests, subprocess
//! invocation and result transports.

pub mod invoker;
pub mod output;
pub mod registry;
