use crate::errors::RoteError;
use crate::logging::append_run_log;
use crate::types::Locator;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The browser automation backend. Each call blocks until the browser has
/// finished (or failed) the interaction.
pub trait BrowserDriver: Send + Sync {
    fn navigate(&self, url: &str) -> Result<(), RoteError>;
    fn click(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError>;
    fn type_text(&self, locator: &Locator, text: &str, timeout_ms: u64) -> Result<(), RoteError>;
    fn find_element(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError>;
    fn get_text(&self, locator: &Locator, timeout_ms: u64) -> Result<String, RoteError>;
    fn hover(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError>;
    fn double_click(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError>;
    fn right_click(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError>;
    fn press_key(&self, key: &str) -> Result<(), RoteError>;
    fn drag_and_drop(
        &self,
        source: &Locator,
        target: &Locator,
        timeout_ms: u64,
    ) -> Result<(), RoteError>;
    fn upload_file(
        &self,
        locator: &Locator,
        file_path: &str,
        timeout_ms: u64,
    ) -> Result<(), RoteError>;
    fn current_url(&self) -> Result<Option<String>, RoteError>;
}

/// Accepts every call, logs it, and remembers the last navigated URL.
#[derive(Debug, Default)]
pub struct DryRunDriver {
    url: Mutex<Option<String>>,
}

impl DryRunDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, method: &str, detail: serde_json::Value) {
        append_run_log(
            "info",
            "driver.dry_run.call",
            json!({ "method": method, "detail": detail }),
        );
    }
}

impl BrowserDriver for DryRunDriver {
    fn navigate(&self, url: &str) -> Result<(), RoteError> {
        self.log("navigate", json!({ "url": url }));
        *locked(&self.url) = Some(url.to_string());
        Ok(())
    }

    fn click(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError> {
        self.log(
            "click",
            json!({ "locator": locator.to_string(), "timeout_ms": timeout_ms }),
        );
        Ok(())
    }

    fn type_text(&self, locator: &Locator, text: &str, timeout_ms: u64) -> Result<(), RoteError> {
        self.log(
            "type_text",
            json!({
                "locator": locator.to_string(),
                "text_len": text.chars().count(),
                "timeout_ms": timeout_ms,
            }),
        );
        Ok(())
    }

    fn find_element(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError> {
        self.log(
            "find_element",
            json!({ "locator": locator.to_string(), "timeout_ms": timeout_ms }),
        );
        Ok(())
    }

    fn get_text(&self, locator: &Locator, timeout_ms: u64) -> Result<String, RoteError> {
        self.log(
            "get_text",
            json!({ "locator": locator.to_string(), "timeout_ms": timeout_ms }),
        );
        Ok(String::new())
    }

    fn hover(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError> {
        self.log(
            "hover",
            json!({ "locator": locator.to_string(), "timeout_ms": timeout_ms }),
        );
        Ok(())
    }

    fn double_click(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError> {
        self.log(
            "double_click",
            json!({ "locator": locator.to_string(), "timeout_ms": timeout_ms }),
        );
        Ok(())
    }

    fn right_click(&self, locator: &Locator, timeout_ms: u64) -> Result<(), RoteError> {
        self.log(
            "right_click",
            json!({ "locator": locator.to_string(), "timeout_ms": timeout_ms }),
        );
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<(), RoteError> {
        self.log("press_key", json!({ "key": key }));
        Ok(())
    }

    fn drag_and_drop(
        &self,
        source: &Locator,
        target: &Locator,
        timeout_ms: u64,
    ) -> Result<(), RoteError> {
        self.log(
            "drag_and_drop",
            json!({
                "source": source.to_string(),
                "target": target.to_string(),
                "timeout_ms": timeout_ms,
            }),
        );
        Ok(())
    }

    fn upload_file(
        &self,
        locator: &Locator,
        file_path: &str,
        timeout_ms: u64,
    ) -> Result<(), RoteError> {
        self.log(
            "upload_file",
            json!({
                "locator": locator.to_string(),
                "file_path": file_path,
                "timeout_ms": timeout_ms,
            }),
        );
        Ok(())
    }

    fn current_url(&self) -> Result<Option<String>, RoteError> {
        Ok(locked(&self.url).clone())
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCall {
    pub method: &'static str,
    pub detail: String,
}

type CallHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Scriptable driver for tests: records every call, fails chosen calls, and
/// runs an optional hook with the zero-based call index before answering.
#[derive(Default)]
pub struct FakeDriver {
    calls: Mutex<Vec<DriverCall>>,
    failures: Mutex<BTreeMap<usize, String>>,
    texts: Mutex<BTreeMap<String, String>>,
    url: Mutex<Option<String>>,
    hook: Mutex<Option<CallHook>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the call with zero-based index `index` fail with `message`.
    pub fn fail_call(&self, index: usize, message: impl Into<String>) {
        locked(&self.failures).insert(index, message.into());
    }

    pub fn set_text(&self, locator: &Locator, text: impl Into<String>) {
        locked(&self.texts).insert(locator.to_string(), text.into());
    }

    pub fn on_call(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *locked(&self.hook) = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        locked(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }

    fn record(&self, method: &'static str, detail: String) -> Result<(), RoteError> {
        let index = {
            let mut calls = locked(&self.calls);
            calls.push(DriverCall { method, detail });
            calls.len() - 1
        };
        let hook = locked(&self.hook).clone();
        if let Some(hook) = hook {
            hook(index);
        }
        match locked(&self.failures).get(&index) {
            Some(message) => Err(RoteError::Driver(message.clone())),
            None => Ok(()),
        }
    }
}

impl BrowserDriver for FakeDriver {
    fn navigate(&self, url: &str) -> Result<(), RoteError> {
        self.record("navigate", url.to_string())?;
        *locked(&self.url) = Some(url.to_string());
        Ok(())
    }

    fn click(&self, locator: &Locator, _timeout_ms: u64) -> Result<(), RoteError> {
        self.record("click", locator.to_string())
    }

    fn type_text(&self, locator: &Locator, text: &str, _timeout_ms: u64) -> Result<(), RoteError> {
        self.record("type_text", format!("{locator} <- {text}"))
    }

    fn find_element(&self, locator: &Locator, _timeout_ms: u64) -> Result<(), RoteError> {
        self.record("find_element", locator.to_string())
    }

    fn get_text(&self, locator: &Locator, _timeout_ms: u64) -> Result<String, RoteError> {
        self.record("get_text", locator.to_string())?;
        Ok(locked(&self.texts)
            .get(&locator.to_string())
            .cloned()
            .unwrap_or_default())
    }

    fn hover(&self, locator: &Locator, _timeout_ms: u64) -> Result<(), RoteError> {
        self.record("hover", locator.to_string())
    }

    fn double_click(&self, locator: &Locator, _timeout_ms: u64) -> Result<(), RoteError> {
        self.record("double_click", locator.to_string())
    }

    fn right_click(&self, locator: &Locator, _timeout_ms: u64) -> Result<(), RoteError> {
        self.record("right_click", locator.to_string())
    }

    fn press_key(&self, key: &str) -> Result<(), RoteError> {
        self.record("press_key", key.to_string())
    }

    fn drag_and_drop(
        &self,
        source: &Locator,
        target: &Locator,
        _timeout_ms: u64,
    ) -> Result<(), RoteError> {
        self.record("drag_and_drop", format!("{source} -> {target}"))
    }

    fn upload_file(
        &self,
        locator: &Locator,
        file_path: &str,
        _timeout_ms: u64,
    ) -> Result<(), RoteError> {
        self.record("upload_file", format!("{locator} <- {file_path}"))
    }

    fn current_url(&self) -> Result<Option<String>, RoteError> {
        Ok(locked(&self.url).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocatorBy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dry_run_tracks_current_url() {
        let driver = DryRunDriver::new();
        assert_eq!(driver.current_url().expect("url"), None);
        driver.navigate("https://x.test/a").expect("navigate");
        driver
            .click(&Locator::new(LocatorBy::Id, "go"), 1000)
            .expect("click");
        assert_eq!(
            driver.current_url().expect("url").as_deref(),
            Some("https://x.test/a")
        );
        assert_eq!(
            driver
                .get_text(&Locator::new(LocatorBy::Css, "h1"), 1000)
                .expect("text"),
            ""
        );
    }

    #[test]
    fn fake_keeps_working_after_a_poisoned_lock() {
        let driver = Arc::new(FakeDriver::new());
        let poisoner = Arc::clone(&driver);
        let joined = std::thread::spawn(move || {
            let _calls = poisoner.calls.lock().expect("calls lock");
            panic!("panic while holding the call log");
        })
        .join();
        assert!(joined.is_err());
        assert!(driver.calls.is_poisoned());

        driver.navigate("https://x.test/").expect("navigate");
        assert_eq!(driver.call_count(), 1);
        assert_eq!(
            driver.current_url().expect("url").as_deref(),
            Some("https://x.test/")
        );
    }

    #[test]
    fn fake_fails_scripted_call_and_keeps_recording() {
        let driver = FakeDriver::new();
        driver.fail_call(1, "element not interactable");
        driver.navigate("https://x.test").expect("first call");
        let err = driver
            .click(&Locator::new(LocatorBy::Id, "go"), 10)
            .expect_err("second call fails");
        assert!(matches!(err, RoteError::Driver(message) if message == "element not interactable"));
        driver.press_key("Enter").expect("third call");

        let methods = driver
            .calls()
            .into_iter()
            .map(|call| call.method)
            .collect::<Vec<_>>();
        assert_eq!(methods, vec!["navigate", "click", "press_key"]);
    }

    #[test]
    fn fake_hook_sees_each_call_index() {
        let driver = FakeDriver::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        driver.on_call(move |index| {
            counter.store(index + 1, Ordering::SeqCst);
        });
        driver.press_key("a").expect("a");
        driver.press_key("b").expect("b");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fake_returns_configured_text() {
        let driver = FakeDriver::new();
        let heading = Locator::new(LocatorBy::Css, "h1");
        driver.set_text(&heading, "Welcome");
        assert_eq!(driver.get_text(&heading, 10).expect("text"), "Welcome");
        assert_eq!(
            driver
                .get_text(&Locator::new(LocatorBy::Css, "h2"), 10)
                .expect("text"),
            ""
        );
    }
}
