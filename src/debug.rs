use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

pub(crate) struct DebugLogger {
    inner: Mutex<DebugState>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            }),
        })
    }

    pub fn event(&self, kind: &str, text_fields: &[(&str, &str)], num_fields: &[(&str, u64)]) {
        let mut json = format!("{{\"type\":\"{}\"", json_escape(kind));
        for (key, value) in text_fields {
            json.push_str(&format!(
                ",\"{}\":\"{}\"",
                json_escape(key),
                json_escape(value)
            ));
        }
        for (key, value) in num_fields {
            json.push_str(&format!(",\"{}\":{}", json_escape(key), value));
        }
        json.push('}');
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn increment(&self, key: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = std::mem::take(&mut state.counters);
            let mut counts_json = String::from("{");
            for (idx, (key, value)) in counters.iter().enumerate() {
                if idx > 0 {
                    counts_json.push(',');
                }
                counts_json.push_str(&format!("\"{}\":{}", json_escape(key), value));
            }
            counts_json.push('}');
            let json = format!(
                "{{\"type\":\"debug.summary\",\"context\":\"{}\",\"counts\":{}}}",
                json_escape(context),
                counts_json
            );
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
