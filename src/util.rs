use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use http::HeaderMap;

const MAX_ERROR_BODY_LEN: usize = 2048;
const REDACTED: &str = "<redacted>";

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(uri_text) else {
        return uri_text.split('?').next().unwrap_or(uri_text).to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

pub(crate) fn default_sensitive_headers() -> BTreeSet<String> {
    ["authorization", "proxy-authorization", "cookie", "set-cookie"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
}

pub(crate) fn format_headers_for_logs(headers: &HeaderMap, sensitive: &BTreeSet<String>) -> String {
    let mut rendered = String::from("[");
    for (index, (name, value)) in headers.iter().enumerate() {
        if index > 0 {
            rendered.push_str(", ");
        }
        rendered.push_str(name.as_str());
        rendered.push_str(": ");
        if sensitive.contains(name.as_str()) {
            rendered.push_str(REDACTED);
        } else {
            rendered.push_str(&String::from_utf8_lossy(value.as_bytes()));
        }
    }
    rendered.push(']');
    rendered
}

pub(crate) fn default_port(scheme: Option<&str>) -> u16 {
    match scheme {
        Some(scheme) if scheme.eq_ignore_ascii_case("https") => 443,
        _ => 80,
    }
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// A sticky wake-up flag that blocked threads can sleep on.
#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    raised: Mutex<bool>,
    condvar: Condvar,
}

impl WakeSignal {
    pub(crate) fn raise(&self) {
        let mut raised = lock_unpoisoned(&self.raised);
        *raised = true;
        self.condvar.notify_all();
    }

    pub(crate) fn is_raised(&self) -> bool {
        *lock_unpoisoned(&self.raised)
    }

    /// Blocks for up to `duration`. Returns `true` if the signal is (or becomes) raised.
    pub(crate) fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut raised = lock_unpoisoned(&self.raised);
        while !*raised {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    raised = match self.condvar.wait_timeout(raised, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    };
                }
                None => {
                    raised = match self.condvar.wait(raised) {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
            }
        }
        true
    }
}
