use core::fmt;

/// Per-channel context prepended to transport log lines.
pub struct ChannelContext {
    pub channel: u8,
}

impl fmt::Display for ChannelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel={}", self.channel)
    }
}

// =============================================
// Logging Macros (namespaced under crate::log)
// =============================================

// ===== rot_info! =====
macro_rules! rot_info {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        log::info!(concat!("[{}] ", $fmt), $ctx $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::info!($fmt $(, $($arg)+)?);
    }};
}

// ===== rot_warn! =====
macro_rules! rot_warn {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        log::warn!(concat!("[{}] ", $fmt), $ctx $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::warn!($fmt $(, $($arg)+)?);
    }};
}

// ===== rot_error! =====
macro_rules! rot_error {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        log::error!(concat!("[{}] ", $fmt), $ctx $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::error!($fmt $(, $($arg)+)?);
    }};
}

// ===== rot_debug! =====
macro_rules! rot_debug {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        log::debug!(concat!("[{}] ", $fmt), $ctx $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::debug!($fmt $(, $($arg)+)?);
    }};
}

// ===== rot_trace! =====
macro_rules! rot_trace {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        log::trace!(concat!("[{}] ", $fmt), $ctx $(, $($arg)+)?);
    }};
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        log::trace!($fmt $(, $($arg)+)?);
    }};
}

// Re-export macros for use in other files
pub(crate) use rot_debug;
pub(crate) use rot_error;
pub(crate) use rot_info;
pub(crate) use rot_trace;
pub(crate) use rot_warn;
