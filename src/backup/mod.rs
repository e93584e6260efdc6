pub mod compress;
pub mod config;
pub mod encrypt;
pub mod file_ext;
pub mod finish;
pub mod naming;
pub mod orchestrator;
pub mod pipeline;
pub mod plugin;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod storage;
pub mod tar;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
