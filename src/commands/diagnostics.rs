use serde_json::Value;

use crate::diagnostics;

pub(crate) fn about(connected: bool) -> Value {
    let mut info = diagnostics::get_about_info();
    info["connected"] = connected.into();
    info["logDir"] = diagnostics::get_log_dir().to_string_lossy().into_owned().into();
    info
}
