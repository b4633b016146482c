//! Built-in native functions.
//!
//! Natives receive their argument slots and return one value. The call site
//! never checks how many arguments were passed.

use std::time::{SystemTime, UNIX_EPOCH};

use object::Value;

/// `clock()`: wall-clock seconds since the Unix epoch.
pub fn clock(_args: &[Value]) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);
    Value::Number(seconds)
}
