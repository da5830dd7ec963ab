//! `tracing` output for the extension: events are flattened to one line
//! and written to the browser console at the matching severity.

use std::fmt;

use tracing::field::{Field, Visit};

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
#[derive(Debug, Default)]
struct EventLine {
    target: String,
    message: Option<String>,
    fields: Vec<(String, String)>,
}

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
impl EventLine {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for EventLine {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record(field, value.to_string());
    }
}

impl fmt::Display for EventLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.target)?;
        if let Some(message) = &self.message {
            write!(f, " {message}")?;
        }
        for (name, value) in &self.fields {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use console::init;

#[cfg(target_arch = "wasm32")]
mod console {
    use tracing::level_filters::LevelFilter;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;
    use wasm_bindgen::JsValue;

    use super::EventLine;

    struct ConsoleLayer;

    impl<S: Subscriber> Layer<S> for ConsoleLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut line = EventLine::new(event.metadata().target());
            event.record(&mut line);
            let text = JsValue::from_str(&line.to_string());
            match *event.metadata().level() {
                Level::ERROR => web_sys::console::error_1(&text),
                Level::WARN => web_sys::console::warn_1(&text),
                Level::INFO => web_sys::console::info_1(&text),
                _ => web_sys::console::debug_1(&text),
            }
        }
    }

    /// Installs the console subscriber. Later calls keep the first one.
    pub fn init(max_level: LevelFilter) {
        let _ = tracing_subscriber::registry()
            .with(max_level)
            .with(ConsoleLayer)
            .try_init();
    }
}
