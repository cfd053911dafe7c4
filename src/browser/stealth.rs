//! Defaults that make a headless session look like an ordinary desktop browser.
//!
//! This is best-effort evasion of basic bot blocking only.

/// Desktop Chrome on Windows.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

pub const DEFAULT_LOCALE: &str = "en-US";

/// Chromium flags for containerized runtimes.
pub const DEFAULT_LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--disable-blink-features=AutomationControlled",
];

pub fn default_extra_headers() -> Vec<(String, String)> {
    [
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Accept-Encoding", "gzip, deflate, br"),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Runs before any page script. Masks the automation flag and the other
/// signals cheap bot checks look at first.
pub const STEALTH_INIT_SCRIPT: &str = r#"
(() => {
  const define = (obj, prop, getter) => {
    try {
      Object.defineProperty(obj, prop, { get: getter, configurable: true });
    } catch (_) {}
  };

  define(Navigator.prototype, 'webdriver', () => undefined);
  define(Navigator.prototype, 'languages', () => ['en-US', 'en']);
  define(Navigator.prototype, 'plugins', () => [
    { name: 'PDF Viewer', filename: 'internal-pdf-viewer' },
    { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer' },
    { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer' }
  ]);
  define(Navigator.prototype, 'hardwareConcurrency', () => 8);

  if (!window.chrome) {
    window.chrome = { runtime: {}, app: { isInstalled: false } };
  }

  const permissions = window.navigator.permissions;
  if (permissions && permissions.query) {
    const originalQuery = permissions.query.bind(permissions);
    permissions.query = (parameters) =>
      parameters && parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters);
  }

  try {
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function (parameter) {
      if (parameter === 37445) return 'Intel Inc.';
      if (parameter === 37446) return 'Intel Iris OpenGL Engine';
      return getParameter.call(this, parameter);
    };
  } catch (_) {}
})();
"#;
