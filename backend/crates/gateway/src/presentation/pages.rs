//! HTML Pages and Static Assets
//!
//! One sign-in page with an email step and a code step. Which step is
//! visible is the only thing that varies; the markup never depends on
//! whether the email has an account.

/// Which step the page opens on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStep {
    Email,
    Code { email: String, masked_email: String },
}

/// Everything the page template needs
#[derive(Debug, Clone)]
pub struct PageView<'a> {
    pub step: PageStep,
    pub csrf_cookie_name: &'a str,
    pub csrf_header_name: &'a str,
}

pub const SCRIPT_PATH: &str = "/oauth/assets/otp.js";
pub const STYLE_PATH: &str = "/oauth/assets/otp.css";

/// Escape text for HTML element content and quoted attribute values
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_sign_in_page(view: &PageView<'_>) -> String {
    let (email_hidden, code_hidden, email, masked) = match &view.step {
        PageStep::Email => ("", " hidden", String::new(), String::new()),
        PageStep::Code {
            email,
            masked_email,
        } => (" hidden", "", escape_html(email), escape_html(masked_email)),
    };

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="referrer" content="no-referrer">
<title>Sign in</title>
<link rel="stylesheet" href="{style}">
<script src="{script}" defer></script>
</head>
<body data-csrf-cookie="{csrf_cookie}" data-csrf-header="{csrf_header}">
<main>
<section id="email-step"{email_hidden}>
<h1>Sign in</h1>
<p>Enter your email address and we will send you a sign-in code.</p>
<form id="email-form">
<label for="email">Email</label>
<input id="email" name="email" type="email" autocomplete="email" required>
<button type="submit">Send code</button>
</form>
</section>
<section id="code-step"{code_hidden}>
<h1>Check your email</h1>
<p>If <strong id="masked-email">{masked}</strong> can sign in, a code is on its way.</p>
<form id="code-form">
<input id="code-email" name="email" type="hidden" value="{email}">
<label for="code">Code</label>
<input id="code" name="code" inputmode="numeric" autocomplete="one-time-code" required>
<button type="submit">Verify</button>
</form>
<button id="resend" type="button">Send a new code</button>
</section>
<p id="message" role="alert"></p>
</main>
</body>
</html>
"#,
        style = STYLE_PATH,
        script = SCRIPT_PATH,
        csrf_cookie = escape_html(view.csrf_cookie_name),
        csrf_header = escape_html(view.csrf_header_name),
        email_hidden = email_hidden,
        code_hidden = code_hidden,
        masked = masked,
        email = email,
    )
}

pub const OTP_STYLE: &str = r#"body {
  font-family: system-ui, sans-serif;
  background: #f6f7f9;
  color: #1c1e21;
  margin: 0;
}
main {
  max-width: 24rem;
  margin: 10vh auto;
  padding: 2rem;
  background: #fff;
  border-radius: 0.75rem;
  box-shadow: 0 1px 4px rgba(0, 0, 0, 0.08);
}
label { display: block; margin: 1rem 0 0.25rem; font-weight: 600; }
input { width: 100%; box-sizing: border-box; padding: 0.6rem; font-size: 1rem; }
#code { letter-spacing: 0.3em; font-variant-numeric: tabular-nums; }
button { margin-top: 1rem; padding: 0.6rem 1rem; font-size: 1rem; cursor: pointer; }
#resend { background: none; border: none; color: #0b57d0; padding: 0; }
#message { min-height: 1.5em; color: #b3261e; }
"#;

pub const OTP_SCRIPT: &str = r#""use strict";

(() => {
  const body = document.body;
  const cookieName = body.dataset.csrfCookie;
  const headerName = body.dataset.csrfHeader;
  const message = document.getElementById("message");

  const csrfToken = () => {
    for (const part of document.cookie.split(";")) {
      const [name, ...rest] = part.trim().split("=");
      if (name === cookieName) return decodeURIComponent(rest.join("="));
    }
    return "";
  };

  const post = async (path, payload) => {
    const response = await fetch(path, {
      method: "POST",
      credentials: "same-origin",
      headers: { "Content-Type": "application/json", [headerName]: csrfToken() },
      body: JSON.stringify(payload),
    });
    const data = await response.json().catch(() => ({}));
    return { status: response.status, data };
  };

  const show = (text) => { message.textContent = text; };

  const explain = ({ status, data }) => {
    if (status === 429) return "Too many requests. Wait a few minutes and try again.";
    if (data && data.detail) return data.action ? `${data.detail}. ${data.action}.` : data.detail;
    return "Something went wrong. Try again.";
  };

  const sendCode = async (email) => {
    const result = await post("/oauth/send-code", { email });
    if (result.status === 200 && result.data.ok) {
      document.getElementById("code-email").value = email;
      document.getElementById("masked-email").textContent = result.data.email;
      document.getElementById("email-step").hidden = true;
      document.getElementById("code-step").hidden = false;
      document.getElementById("code").focus();
      show("");
    } else {
      show(explain(result));
    }
  };

  document.getElementById("email-form").addEventListener("submit", (event) => {
    event.preventDefault();
    sendCode(document.getElementById("email").value.trim()).catch(() => show("Network error. Try again."));
  });

  document.getElementById("resend").addEventListener("click", () => {
    sendCode(document.getElementById("code-email").value)
      .then(() => show("A new code was sent. Older codes no longer work."))
      .catch(() => show("Network error. Try again."));
  });

  document.getElementById("code-form").addEventListener("submit", async (event) => {
    event.preventDefault();
    try {
      const result = await post("/oauth/verify-code", {
        email: document.getElementById("code-email").value,
        code: document.getElementById("code").value,
      });
      if (result.data.ok && result.data.redirect) {
        window.location.assign(result.data.redirect);
      } else if (result.status === 200) {
        show("That code did not work. Check it or send a new one.");
      } else {
        show(explain(result));
      }
    } catch {
      show("Network error. Try again.");
    }
  });
})();
"#;
