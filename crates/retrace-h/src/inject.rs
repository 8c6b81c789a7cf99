//! Element operations evaluated in the page.
//!
//! Every call evaluates `LOCATOR_JS` with an operation name, a locator and the
//! frame to search, so nothing has to survive navigations. The helper understands
//! the engine's locator grammar: CSS, `xpath=`, `text=` and `role=<role>[name="..."]`.

use chromiumoxide::Page;
use retrace_engine::backend::{BackendError, ElementTarget, FrameScope};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;

/// Prevents hanging when dialogs (alert/confirm/prompt) block the JS thread.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

const LOCATOR_JS: &str = r#"(function (op, locator, frame, arg) {
  const frames = () => Array.from(document.querySelectorAll('iframe,frame'));
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const IMPLICIT = {
    button: 'button,input[type=button],input[type=submit],input[type=reset]',
    link: 'a[href]',
    textbox: 'input:not([type]),input[type=text],input[type=email],input[type=password],input[type=search],input[type=tel],input[type=url],textarea',
    checkbox: 'input[type=checkbox]',
    radio: 'input[type=radio]',
    combobox: 'select'
  };
  const accName = (el) => norm(el.getAttribute('aria-label') || el.value || el.innerText || el.textContent || el.getAttribute('title'));

  function scope() {
    if (frame < 0) return document;
    const f = frames()[frame];
    try { return f ? f.contentDocument : null; } catch (e) { return null; }
  }

  function find(d) {
    if (locator.startsWith('xpath=')) {
      return d.evaluate(locator.slice(6), d, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    }
    if (locator.startsWith('text=')) {
      const want = norm(locator.slice(5));
      let best = null;
      for (const el of d.body ? d.body.querySelectorAll('*') : []) {
        if (['SCRIPT', 'STYLE', 'NOSCRIPT'].includes(el.tagName)) continue;
        if (norm(el.innerText || el.textContent).includes(want) && (!best || best.contains(el))) best = el;
      }
      return best;
    }
    if (locator.startsWith('role=')) {
      const m = /^role=([\w-]+)(?:\[name="((?:[^"\\]|\\.)*)"\])?$/.exec(locator);
      if (!m) throw new SyntaxError('bad role locator');
      const role = m[1];
      const name = m[2] === undefined ? null : norm(m[2].replace(/\\(.)/g, '$1'));
      const candidates = Array.from(d.querySelectorAll('[role="' + role + '"]' + (IMPLICIT[role] ? ',' + IMPLICIT[role] : '')));
      if (name === null) return candidates[0] || null;
      return candidates.find((el) => accName(el) === name) || candidates.find((el) => accName(el).includes(name)) || null;
    }
    return d.querySelector(locator);
  }

  const visible = (el) => {
    const s = el.ownerDocument.defaultView.getComputedStyle(el);
    const r = el.getBoundingClientRect();
    return s.visibility !== 'hidden' && s.display !== 'none' && r.width > 0 && r.height > 0;
  };

  const setValue = (el, value) => {
    const w = el.ownerDocument.defaultView;
    if (el.isContentEditable) { el.textContent = value; return; }
    const proto = el instanceof w.HTMLTextAreaElement ? w.HTMLTextAreaElement.prototype
      : el instanceof w.HTMLSelectElement ? w.HTMLSelectElement.prototype
      : w.HTMLInputElement.prototype;
    const desc = Object.getOwnPropertyDescriptor(proto, 'value');
    if (desc && desc.set) desc.set.call(el, value); else el.value = value;
  };

  const submitOf = (el) => {
    const form = el.form || el.closest('form');
    return form ? form.querySelector('button[type=submit],input[type=submit],button:not([type])') : null;
  };

  try {
    if (op === 'frame_count') return { ok: true, value: frames().length };
    if (op === 'scroll_to') { window.scrollTo(arg.x, arg.y); return { ok: true }; }
    const d = scope();
    if (!d) return { ok: false, error: 'frame_unavailable' };
    const el = find(d);
    if (!el) return { ok: false, error: 'not_found' };
    switch (op) {
      case 'visible': return { ok: true, value: visible(el) };
      case 'point': {
        el.scrollIntoView({ block: 'center', inline: 'center' });
        const r = el.getBoundingClientRect();
        let x = r.left + r.width / 2, y = r.top + r.height / 2;
        if (frame >= 0) { const f = frames()[frame].getBoundingClientRect(); x += f.left; y += f.top; }
        return { ok: true, value: { x, y } };
      }
      case 'click': el.click(); return { ok: true };
      case 'focus': el.focus(); return { ok: true };
      case 'fill': setValue(el, arg); return { ok: true };
      case 'clear': setValue(el, ''); return { ok: true };
      case 'value': return { ok: true, value: el.isContentEditable ? el.textContent : (el.value == null ? '' : String(el.value)) };
      case 'disabled': return { ok: true, value: !!el.disabled || el.getAttribute('aria-disabled') === 'true' };
      case 'scroll_into_view': el.scrollIntoView({ block: 'center' }); return { ok: true };
      case 'dispatch': {
        const w = el.ownerDocument.defaultView;
        for (const type of arg) {
          if (type === 'blur' && el.ownerDocument.activeElement === el) { el.blur(); continue; }
          el.dispatchEvent(new w.Event(type, { bubbles: type !== 'blur' }));
        }
        return { ok: true };
      }
      case 'field_info': return { ok: true, value: {
        inputType: el.getAttribute('type') || (el.tagName === 'INPUT' ? 'text' : null),
        name: el.getAttribute('name'),
        id: el.id || null,
        placeholder: el.getAttribute('placeholder'),
        autocomplete: el.getAttribute('autocomplete')
      } };
      case 'has_form_submit': return { ok: true, value: !!submitOf(el) };
      case 'click_form_submit': {
        const button = submitOf(el);
        if (!button) return { ok: true, value: false };
        button.click();
        return { ok: true, value: true };
      }
      default: return { ok: false, error: 'unknown_op', message: op };
    }
  } catch (e) {
    return { ok: false, error: e && e.name === 'SyntaxError' ? 'invalid_locator' : 'script', message: String(e) };
  }
})"#;

#[derive(Debug, Deserialize)]
struct HelperReply {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Run `op` against `target` and return the helper's value.
pub async fn element_op(
    page: &Page,
    op: &str,
    target: &ElementTarget,
    arg: Value,
) -> Result<Value, BackendError> {
    let frame = match target.frame {
        FrameScope::Main => -1,
        FrameScope::Frame(i) => i as i64,
    };
    let expression = build_expression(op, &target.locator, frame, &arg);
    let reply: HelperReply = serde_json::from_value(evaluate(page, &expression).await?)?;
    into_result(reply, target)
}

/// Run an operation that does not address an element (`frame_count`, `scroll_to`).
pub async fn page_op(page: &Page, op: &str, arg: Value) -> Result<Value, BackendError> {
    let expression = build_expression(op, "", -1, &arg);
    let reply: HelperReply = serde_json::from_value(evaluate(page, &expression).await?)?;
    into_result(reply, &ElementTarget::main(""))
}

fn build_expression(op: &str, locator: &str, frame: i64, arg: &Value) -> String {
    format!(
        "{}({},{},{},{})",
        LOCATOR_JS,
        json!(op),
        json!(locator),
        frame,
        arg
    )
}

fn into_result(reply: HelperReply, target: &ElementTarget) -> Result<Value, BackendError> {
    if reply.ok {
        return Ok(reply.value);
    }
    let locator = target.to_string();
    Err(match reply.error.as_deref() {
        Some("not_found") | Some("frame_unavailable") => BackendError::ElementNotFound { locator },
        Some("invalid_locator") => BackendError::LocatorInvalid { locator },
        other => BackendError::ScriptError(
            reply
                .message
                .or(other.map(String::from))
                .unwrap_or_else(|| "unknown helper error".into()),
        ),
    })
}

/// Check if an error indicates the page context is unavailable (e.g., during navigation).
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

/// Evaluate `expression`, retrying while the page is between documents.
pub async fn evaluate(page: &Page, expression: &str) -> Result<Value, BackendError> {
    retry_on_context_error(|| evaluate_with_timeout(page, expression)).await
}

async fn retry_on_context_error<F, Fut>(mut operation: F) -> Result<Value, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, EvalError>>,
{
    let mut last_error = None;
    for attempt in 0..MAX_CONTEXT_RETRIES {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(EvalError::Timeout) => {
                return Err(BackendError::Timeout {
                    operation: "script evaluation (possibly blocked by a dialog)".into(),
                });
            }
            Err(EvalError::Context(err)) => {
                tracing::debug!(
                    "Context error during evaluation (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err)) => return Err(BackendError::ScriptError(err)),
        }
    }
    Err(BackendError::ScriptError(last_error.unwrap_or_else(|| {
        "evaluation failed after retries".to_string()
    })))
}

async fn evaluate_with_timeout(page: &Page, expression: &str) -> Result<Value, EvalError> {
    let eval_result = tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await;

    match eval_result {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        Ok(Ok(remote_object)) => Ok(remote_object.into_value::<Value>().unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_embeds_arguments_as_json() {
        let expr = build_expression("fill", "[name=\"q\"]", 2, &json!("it's \"quoted\""));
        assert!(expr.ends_with(r#"("fill","[name=\"q\"]",2,"it's \"quoted\"")"#));
    }

    #[test]
    fn test_helper_errors_map_to_backend_errors() {
        let target = ElementTarget::in_frame("#x", 1);
        let not_found = HelperReply {
            ok: false,
            value: Value::Null,
            error: Some("not_found".into()),
            message: None,
        };
        assert!(matches!(
            into_result(not_found, &target),
            Err(BackendError::ElementNotFound { locator }) if locator == "#x (frame 1)"
        ));

        let invalid = HelperReply {
            ok: false,
            value: Value::Null,
            error: Some("invalid_locator".into()),
            message: Some("SyntaxError".into()),
        };
        assert!(matches!(
            into_result(invalid, &target),
            Err(BackendError::LocatorInvalid { .. })
        ));
    }

    #[test]
    fn test_context_errors_are_recognized() {
        assert!(is_context_error("Execution context was destroyed."));
        assert!(!is_context_error("ReferenceError: x is not defined"));
    }
}
