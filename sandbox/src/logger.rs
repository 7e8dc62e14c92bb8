use env_logger::fmt::style;
use log::LevelFilter;
use std::cell::RefCell;
use std::io::Write;

thread_local! {
    static MATCH_LOG_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Tags every subsequent log line on this thread with the given match id.
pub fn log_match_context(match_id: &str) {
    MATCH_LOG_CONTEXT.set(Some(match_id.to_string()));
}

pub fn initialize_log() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .format(|buf, record| {
            let dim = style::AnsiColor::BrightBlack.on_default();
            let level_style = buf.default_level_style(record.level());

            write!(buf, "{dim}[{dim:#}{}", buf.timestamp_millis())?;
            write!(buf, " {level_style}{:<5}{level_style:#}", record.level())?;
            if let Some(match_id) = MATCH_LOG_CONTEXT.with_borrow(|context| context.clone()) {
                write!(buf, " {match_id}")?;
            }
            write!(buf, "{dim}]{dim:#} ")?;
            writeln!(buf, "{}", record.args())
        })
        .init();
}
