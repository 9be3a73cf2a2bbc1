//! Custom assertion macros
//!
//! Provides assertion macros with more descriptive failure output for
//! sync reports and fallible calls.

/// Assert that a result is ok and return the value
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert selected counters of a `SyncReport`
///
/// ```ignore
/// assert_report!(report, succeeded = 2, retried = 0, terminal = 0);
/// ```
macro_rules! assert_report {
    ($report:expr, $($field:ident = $value:expr),+ $(,)?) => {{
        let report = &$report;
        $(
            assert_eq!(
                report.$field,
                $value,
                "report.{} mismatch in {:?}",
                stringify!($field),
                report
            );
        )+
    }};
}
