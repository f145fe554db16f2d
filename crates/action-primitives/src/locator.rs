//! Locator descriptions and the in-page script that resolves them.
//!
//! A [`Locator`] serialises to JSON and is interpreted by a single script
//! evaluated in the page. The script supports a handful of operations
//! (`locate`, `count`, `texts`, `element`, `focus`, `change`, `select`), so
//! every element interaction is one `Runtime.evaluate` round trip.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::ActionError;

/// How the candidate elements are found.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "by", rename_all = "lowercase")]
pub enum LocatorKind {
    Css {
        selector: String,
    },
    /// Explicit `role` attribute or the implicit role of the tag, optionally
    /// filtered by accessible name.
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
    /// Form control whose `<label>` (or `aria-label`) matches.
    Label { text: String, exact: bool },
    /// Leaf-most elements whose rendered text matches the regex.
    Text { pattern: String, ignore_case: bool },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Locator {
    #[serde(flatten)]
    pub kind: LocatorKind,
    /// CSS selector of an iframe whose document is searched instead.
    pub frame: Option<String>,
    /// Search only inside the first match of this locator.
    pub parent: Option<Box<Locator>>,
    pub nth: Option<usize>,
}

impl Locator {
    fn from_kind(kind: LocatorKind) -> Self {
        Self {
            kind,
            frame: None,
            parent: None,
            nth: None,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Css {
            selector: selector.into(),
        })
    }

    /// Role with a case-insensitive substring match on the accessible name.
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Role {
            role: role.into(),
            name: Some(name.into()),
            exact: false,
        })
    }

    pub fn any_role(role: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Role {
            role: role.into(),
            name: None,
            exact: false,
        })
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Label {
            text: text.into(),
            exact: false,
        })
    }

    /// Regex in JavaScript syntax matched against normalised element text.
    pub fn text(pattern: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Text {
            pattern: pattern.into(),
            ignore_case: false,
        })
    }

    /// Case-insensitive literal text match.
    pub fn text_ci(literal: &str) -> Self {
        Self::from_kind(LocatorKind::Text {
            pattern: escape_pattern(literal),
            ignore_case: true,
        })
    }

    /// Turns a substring match on name/label into a whole-string match.
    pub fn exact(mut self) -> Self {
        match &mut self.kind {
            LocatorKind::Role { exact, .. } | LocatorKind::Label { exact, .. } => *exact = true,
            LocatorKind::Text { pattern, .. } => {
                *pattern = format!("^(?:{pattern})$");
            }
            LocatorKind::Css { .. } => {}
        }
        self
    }

    pub fn in_frame(mut self, frame_selector: impl Into<String>) -> Self {
        self.frame = Some(frame_selector.into());
        self
    }

    pub fn within(mut self, parent: Locator) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// Rejects descriptions the page script cannot evaluate.
    pub fn validate(&self) -> Result<(), ActionError> {
        match &self.kind {
            LocatorKind::Css { selector } if selector.trim().is_empty() => {
                return Err(ActionError::Internal("empty CSS selector".into()));
            }
            LocatorKind::Role { role, .. } if role.trim().is_empty() => {
                return Err(ActionError::Internal("empty role".into()));
            }
            LocatorKind::Text { pattern, .. } => {
                Regex::new(pattern).map_err(|err| {
                    ActionError::Internal(format!("invalid text pattern '{pattern}': {err}"))
                })?;
            }
            _ => {}
        }
        if let Some(parent) = &self.parent {
            parent.validate()?;
        }
        Ok(())
    }

    pub(crate) fn script(&self, op: ScriptOp, arg: Option<&str>) -> Result<String, ActionError> {
        self.validate()?;
        let loc = serde_json::to_string(self)
            .map_err(|err| ActionError::Internal(format!("locator encode failed: {err}")))?;
        let op = serde_json::to_string(op.as_str())
            .map_err(|err| ActionError::Internal(err.to_string()))?;
        let arg = json!(arg).to_string();
        Ok(format!("({LOCATOR_JS})({loc}, {op}, {arg})"))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent} >> ")?;
        }
        if let Some(frame) = &self.frame {
            write!(f, "frame={frame} >> ")?;
        }
        match &self.kind {
            LocatorKind::Css { selector } => write!(f, "css={selector}")?,
            LocatorKind::Role { role, name, exact } => {
                write!(f, "role={role}")?;
                if let Some(name) = name {
                    let eq = if *exact { "=" } else { "~=" };
                    write!(f, "[name{eq}\"{name}\"]")?;
                }
            }
            LocatorKind::Label { text, exact } => {
                let eq = if *exact { "=" } else { "~=" };
                write!(f, "label{eq}\"{text}\"")?;
            }
            LocatorKind::Text {
                pattern,
                ignore_case,
            } => {
                write!(f, "text=/{pattern}/")?;
                if *ignore_case {
                    f.write_str("i")?;
                }
            }
        }
        if let Some(nth) = self.nth {
            write!(f, " >> nth={nth}")?;
        }
        Ok(())
    }
}

/// Escapes characters that are special in both JavaScript and Rust regexes.
fn escape_pattern(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '\\' | '^' | '$' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScriptOp {
    Locate,
    Count,
    Texts,
    Element,
    Focus,
    Change,
    Select,
}

impl ScriptOp {
    fn as_str(&self) -> &'static str {
        match self {
            ScriptOp::Locate => "locate",
            ScriptOp::Count => "count",
            ScriptOp::Texts => "texts",
            ScriptOp::Element => "element",
            ScriptOp::Focus => "focus",
            ScriptOp::Change => "change",
            ScriptOp::Select => "select",
        }
    }
}

/// Parsed reply of the page script.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ScriptReply {
    Point { x: f64, y: f64 },
    Count(usize),
    Texts(Vec<String>),
    Done,
    NotFound,
    FrameMissing,
    OptionMissing,
    NotInteractable(String),
}

impl ScriptReply {
    pub(crate) fn parse(value: &Value) -> Result<Self, ActionError> {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::Script(format!("unexpected locator reply: {value}")))?;
        Ok(match status {
            "ok" => {
                if let (Some(x), Some(y)) = (
                    value.get("x").and_then(Value::as_f64),
                    value.get("y").and_then(Value::as_f64),
                ) {
                    ScriptReply::Point { x, y }
                } else if let Some(count) = value.get("count").and_then(Value::as_u64) {
                    ScriptReply::Count(count as usize)
                } else if let Some(texts) = value.get("texts").and_then(Value::as_array) {
                    ScriptReply::Texts(
                        texts
                            .iter()
                            .map(|t| t.as_str().unwrap_or_default().to_string())
                            .collect(),
                    )
                } else {
                    ScriptReply::Done
                }
            }
            "not-found" => ScriptReply::NotFound,
            "frame-missing" => ScriptReply::FrameMissing,
            "option-missing" => ScriptReply::OptionMissing,
            "not-interactable" => ScriptReply::NotInteractable(
                value
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("element rejected the interaction")
                    .to_string(),
            ),
            other => return Err(ActionError::Script(format!("locator status '{other}'"))),
        })
    }
}

const LOCATOR_JS: &str = r#"(loc, op, arg) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const lower = (s) => norm(s).toLowerCase();
  const textMatch = (value, expected, exact) =>
    exact ? lower(value) === lower(expected) : lower(value).includes(lower(expected));
  const isVisible = (el) => {
    if (!el || !el.ownerDocument) return false;
    const view = el.ownerDocument.defaultView;
    const style = view ? view.getComputedStyle(el) : null;
    if (style && (style.visibility === 'hidden' || style.display === 'none')) return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  const implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || 'text').toLowerCase();
    switch (tag) {
      case 'a': return el.hasAttribute('href') ? 'link' : null;
      case 'button': return 'button';
      case 'input':
        if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        if (type === 'search') return 'searchbox';
        if (['text', 'email', 'tel', 'url', 'password', 'number'].includes(type)) return 'textbox';
        return null;
      case 'textarea': return 'textbox';
      case 'select': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
      case 'option': return 'option';
      case 'li': return 'listitem';
      case 'ul': case 'ol': return 'list';
      case 'table': return 'table';
      case 'tr': return 'row';
      case 'td': return 'cell';
      case 'th': return 'columnheader';
      case 'dialog': return 'dialog';
      case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
      case 'img': return 'img';
      case 'nav': return 'navigation';
      default: return null;
    }
  };
  const roleOf = (el) => {
    const explicit = (el.getAttribute('role') || '').trim().split(/\s+/)[0];
    return explicit ? explicit.toLowerCase() : implicitRole(el);
  };
  const labelText = (el) => {
    const doc = el.ownerDocument;
    const parts = [];
    if (el.id) {
      doc.querySelectorAll('label[for="' + CSS.escape(el.id) + '"]')
        .forEach((label) => parts.push(label.textContent));
    }
    const wrapping = el.closest('label');
    if (wrapping) parts.push(wrapping.textContent);
    return norm(parts.join(' '));
  };
  const byIds = (el, ids) => norm(ids.split(/\s+/)
    .map((id) => el.ownerDocument.getElementById(id))
    .map((node) => node ? node.textContent : '')
    .join(' '));
  const accessibleName = (el) => {
    const aria = el.getAttribute('aria-label');
    if (aria && norm(aria)) return norm(aria);
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) return byIds(el, labelledBy);
    const tag = el.tagName.toLowerCase();
    if (['input', 'select', 'textarea'].includes(tag)) {
      const label = labelText(el);
      if (label) return label;
      if (tag === 'input' && ['button', 'submit', 'reset'].includes((el.type || '').toLowerCase())) {
        return norm(el.value);
      }
      return norm(el.getAttribute('placeholder') || el.title);
    }
    if (tag === 'img') return norm(el.alt || el.title);
    const text = norm(el.innerText || el.textContent);
    return text || norm(el.title);
  };
  const labelable = (el) =>
    ['input', 'select', 'textarea'].includes(el.tagName.toLowerCase()) || el.isContentEditable;
  const all = (root) => Array.from(root.querySelectorAll('*'));
  const candidates = (root, s) => {
    switch (s.by) {
      case 'css':
        return Array.from(root.querySelectorAll(s.selector));
      case 'role':
        return all(root).filter((el) => roleOf(el) === s.role.toLowerCase()
          && (s.name === null || textMatch(accessibleName(el), s.name, s.exact)));
      case 'label':
        return all(root).filter((el) => labelable(el)
          && textMatch(labelText(el) || el.getAttribute('aria-label') || '', s.text, s.exact));
      case 'text': {
        const re = new RegExp(s.pattern, s.ignore_case ? 'i' : '');
        const hits = all(root).filter((el) => !['SCRIPT', 'STYLE', 'NOSCRIPT', 'HEAD', 'TITLE'].includes(el.tagName)
          && re.test(norm(el.innerText || el.textContent)));
        return hits.filter((el) => !hits.some((other) => other !== el && el.contains(other)));
      }
      default:
        throw new Error('unknown locator kind ' + s.by);
    }
  };
  const resolve = (s, visibleOnly) => {
    let root = document;
    let offset = { x: 0, y: 0 };
    if (s.parent) {
      const parent = resolve(s.parent, visibleOnly);
      if (parent.status !== 'ok') return parent;
      const index = s.parent.nth || 0;
      if (parent.elements.length <= index) return { status: 'not-found' };
      root = parent.elements[index];
      offset = parent.offset;
    }
    if (s.frame) {
      const frameEl = root.querySelector(s.frame);
      const doc = frameEl && (frameEl.contentDocument
        || (frameEl.contentWindow ? frameEl.contentWindow.document : null));
      if (!doc) return { status: 'frame-missing' };
      const rect = frameEl.getBoundingClientRect();
      offset = {
        x: offset.x + rect.left + frameEl.clientLeft,
        y: offset.y + rect.top + frameEl.clientTop,
      };
      root = doc;
    }
    let found = candidates(root, s);
    if (visibleOnly) found = found.filter(isVisible);
    return { status: 'ok', elements: found, offset };
  };
  const visibleOnly = op !== 'element' && op !== 'texts';
  const result = resolve(loc, visibleOnly);
  if (op === 'count') {
    return result.status === 'ok' ? { status: 'ok', count: result.elements.length } : { status: 'ok', count: 0 };
  }
  if (result.status !== 'ok') return op === 'element' ? null : { status: result.status };
  if (op === 'texts') {
    return { status: 'ok', texts: result.elements.map((el) => norm(el.innerText || el.textContent)) };
  }
  const el = result.elements[loc.nth || 0];
  if (!el) return op === 'element' ? null : { status: 'not-found' };
  switch (op) {
    case 'element':
      return el;
    case 'locate': {
      el.scrollIntoView({ block: 'center', inline: 'center' });
      const rect = el.getBoundingClientRect();
      let x = result.offset.x + rect.left + rect.width / 2;
      let y = result.offset.y + rect.top + rect.height / 2;
      if (loc.frame || loc.parent) {
        const again = resolve(loc, true);
        if (again.status === 'ok') {
          const fresh = again.elements[loc.nth || 0];
          if (fresh) {
            const r = fresh.getBoundingClientRect();
            x = again.offset.x + r.left + r.width / 2;
            y = again.offset.y + r.top + r.height / 2;
          }
        }
      }
      return { status: 'ok', x, y };
    }
    case 'focus': {
      if (el.disabled || el.readOnly) return { status: 'not-interactable', reason: 'disabled or read-only' };
      let view = el.ownerDocument.defaultView;
      while (view && view.frameElement) {
        view.frameElement.focus();
        view = view.parent;
      }
      el.focus();
      if ('value' in el && !el.isContentEditable) {
        el.value = '';
        el.dispatchEvent(new Event('input', { bubbles: true }));
      } else if (el.isContentEditable) {
        const range = el.ownerDocument.createRange();
        range.selectNodeContents(el);
        const selection = el.ownerDocument.defaultView.getSelection();
        selection.removeAllRanges();
        selection.addRange(range);
        el.ownerDocument.execCommand('delete');
      }
      return { status: 'ok' };
    }
    case 'change':
      el.dispatchEvent(new Event('change', { bubbles: true }));
      el.dispatchEvent(new Event('blur', { bubbles: false }));
      return { status: 'ok' };
    case 'select': {
      if (el.tagName.toLowerCase() !== 'select') return { status: 'not-interactable', reason: 'not a <select>' };
      const options = Array.from(el.options || []);
      const option = options.find((o) => lower(o.text) === lower(arg))
        || options.find((o) => o.value === arg)
        || options.find((o) => lower(o.text).includes(lower(arg)));
      if (!option) return { status: 'option-missing' };
      el.value = option.value;
      el.dispatchEvent(new Event('input', { bubbles: true }));
      el.dispatchEvent(new Event('change', { bubbles: true }));
      return { status: 'ok' };
    }
    default:
      throw new Error('unknown locator op ' + op);
  }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_kind_tag_and_modifiers() {
        let locator = Locator::role("button", "Save")
            .within(Locator::any_role("dialog"))
            .nth(1);
        let value = serde_json::to_value(&locator).unwrap();
        assert_eq!(value["by"], "role");
        assert_eq!(value["name"], "Save");
        assert_eq!(value["nth"], 1);
        assert_eq!(value["parent"]["by"], "role");
        assert_eq!(value["parent"]["name"], Value::Null);
        assert_eq!(value["frame"], Value::Null);
    }

    #[test]
    fn display_reads_like_a_selector_chain() {
        let locator = Locator::label("Description").in_frame("iframe.rte").exact();
        assert_eq!(
            locator.to_string(),
            "frame=iframe.rte >> label=\"Description\""
        );
        assert_eq!(
            Locator::text_ci("Save Changes & Run").to_string(),
            "text=/Save Changes & Run/i"
        );
        assert_eq!(
            Locator::text_ci("Save (draft).").to_string(),
            r"text=/Save \(draft\)\./i"
        );
    }

    #[test]
    fn exact_anchors_text_patterns() {
        let locator = Locator::text("Text|Number").exact();
        match locator.kind {
            LocatorKind::Text { pattern, .. } => assert_eq!(pattern, "^(?:Text|Number)$"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn invalid_patterns_fail_before_reaching_the_page() {
        let err = Locator::text("(unclosed").script(ScriptOp::Locate, None).unwrap_err();
        assert!(matches!(err, ActionError::Internal(_)));
        assert!(Locator::css("  ").validate().is_err());
    }

    #[test]
    fn script_embeds_locator_op_and_argument() {
        let script = Locator::css("select#mode")
            .script(ScriptOp::Select, Some("Add new"))
            .unwrap();
        assert!(script.starts_with("((loc, op, arg) =>"));
        assert!(script.contains(r#""selector":"select#mode""#));
        assert!(script.ends_with(r#", "select", "Add new")"#));
    }

    #[test]
    fn parses_script_replies() {
        assert_eq!(
            ScriptReply::parse(&json!({"status": "ok", "x": 1.5, "y": 2.0})).unwrap(),
            ScriptReply::Point { x: 1.5, y: 2.0 }
        );
        assert_eq!(
            ScriptReply::parse(&json!({"status": "ok", "count": 3})).unwrap(),
            ScriptReply::Count(3)
        );
        assert_eq!(
            ScriptReply::parse(&json!({"status": "ok", "texts": ["a", "b"]})).unwrap(),
            ScriptReply::Texts(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            ScriptReply::parse(&json!({"status": "frame-missing"})).unwrap(),
            ScriptReply::FrameMissing
        );
        assert!(ScriptReply::parse(&json!(null)).is_err());
    }
}
