// Logging bootstrap
//
// Library code logs through `log` and `tracing` macros; this installs the
// subscriber that prints them. Safe to call more than once.

use once_cell::sync::OnceCell;

/// Logcat tag used on Android
pub const LOG_TAG: &str = "FlowstateCalibration";

static INIT: OnceCell<()> = OnceCell::new();

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        fn install() {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            match tracing_android::layer(LOG_TAG) {
                Ok(layer) => {
                    if tracing_subscriber::registry().with(layer).try_init().is_err() {
                        log::debug!("[Logging] Subscriber already installed");
                    }
                }
                Err(err) => eprintln!("[Logging] Failed to open logcat writer: {}", err),
            }
        }
    } else {
        fn install() {
            let result = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
            if result.is_err() {
                log::debug!("[Logging] Subscriber already installed");
            }
        }
    }
}

/// Install the platform log subscriber once per process
pub fn init_logging() {
    INIT.get_or_init(install);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing::info!("[Logging] test message");
    }
}
