//! JS snippets evaluated by session operations.
//!
//! Element operations resolve the selector (CSS, or XPath behind an
//! `xpath=` prefix), act, and return a small tagged JSON object:
//! `{"ok": <value>}` on success, `{"err": "not-found" | "not-interactable"}`
//! otherwise. The session maps the tags onto the error taxonomy.

/// Embeds `text` as a JS string literal (quotes included).
pub fn literal(text: &str) -> String {
	serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Selector resolution prelude: binds `el` or returns `not-found`.
fn find_prelude(selector: &str) -> String {
	let sel = literal(selector);
	format!(
		r#"const sel = {sel};
				let el = null;
				if (sel.startsWith('xpath=')) {{
					el = document.evaluate(sel.slice(6), document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
				}} else {{
					el = document.querySelector(sel);
				}}
				if (!el) return {{ err: 'not-found' }};"#
	)
}

fn element_op(selector: &str, body: &str) -> String {
	let prelude = find_prelude(selector);
	format!(
		r#"(() => {{
				{prelude}
				{body}
			}})()"#
	)
}

/// Interactability gate shared by pointer operations.
const INTERACTABLE_CHECK: &str = r#"if (el.disabled || (el.offsetParent === null && el.tagName !== 'BODY' && el.tagName !== 'HTML')) return { err: 'not-interactable' };"#;

pub fn click(selector: &str) -> String {
	element_op(selector, &format!("{INTERACTABLE_CHECK}\n\t\t\t\tel.click();\n\t\t\t\treturn {{ ok: true }};"))
}

pub fn double_click(selector: &str) -> String {
	element_op(
		selector,
		&format!(
			r#"{INTERACTABLE_CHECK}
				el.dispatchEvent(new MouseEvent('dblclick', {{ bubbles: true, cancelable: true }}));
				return {{ ok: true }};"#
		),
	)
}

pub fn right_click(selector: &str) -> String {
	element_op(
		selector,
		&format!(
			r#"{INTERACTABLE_CHECK}
				el.dispatchEvent(new MouseEvent('contextmenu', {{ bubbles: true, cancelable: true, button: 2 }}));
				return {{ ok: true }};"#
		),
	)
}

pub fn hover(selector: &str) -> String {
	element_op(
		selector,
		r#"el.dispatchEvent(new MouseEvent('mouseover', { bubbles: true }));
				el.dispatchEvent(new MouseEvent('mouseenter', { bubbles: false }));
				return { ok: true };"#,
	)
}

pub fn type_text(selector: &str, text: &str, clear_first: bool) -> String {
	let text = literal(text);
	let clear = if clear_first { "el.value = '';" } else { "" };
	element_op(
		selector,
		&format!(
			r#"{INTERACTABLE_CHECK}
				el.focus();
				{clear}
				if ('value' in el) {{
					el.value += {text};
				}} else if (el.isContentEditable) {{
					el.textContent += {text};
				}}
				el.dispatchEvent(new Event('input', {{ bubbles: true }}));
				el.dispatchEvent(new Event('change', {{ bubbles: true }}));
				return {{ ok: true }};"#
		),
	)
}

pub fn press_key(key: &str) -> String {
	let key = literal(key);
	format!(
		r#"(() => {{
				const target = document.activeElement || document.body;
				const opts = {{ key: {key}, bubbles: true, cancelable: true }};
				target.dispatchEvent(new KeyboardEvent('keydown', opts));
				target.dispatchEvent(new KeyboardEvent('keyup', opts));
				return {{ ok: true }};
			}})()"#
	)
}

pub fn select_option(selector: &str, value: &str) -> String {
	let value = literal(value);
	element_op(
		selector,
		&format!(
			r#"{INTERACTABLE_CHECK}
				el.value = {value};
				el.dispatchEvent(new Event('change', {{ bubbles: true }}));
				return {{ ok: true }};"#
		),
	)
}

pub fn focus(selector: &str) -> String {
	element_op(selector, "el.focus();\n\t\t\t\treturn { ok: true };")
}

pub fn blur(selector: &str) -> String {
	element_op(selector, "el.blur();\n\t\t\t\treturn { ok: true };")
}

pub fn scroll_into_view(selector: &str) -> String {
	element_op(selector, "el.scrollIntoView({ block: 'center', inline: 'center' });\n\t\t\t\treturn { ok: true };")
}

pub fn get_text(selector: &str) -> String {
	element_op(selector, "return { ok: el.innerText !== undefined ? el.innerText : el.textContent };")
}

pub fn get_attribute(selector: &str, name: &str) -> String {
	let name = literal(name);
	element_op(selector, &format!("return {{ ok: el.getAttribute({name}) }};"))
}

pub fn get_html(selector: Option<&str>) -> String {
	match selector {
		Some(selector) => element_op(selector, "return { ok: el.outerHTML };"),
		None => "(() => ({ ok: document.documentElement.outerHTML }))()".to_string(),
	}
}

pub fn element_exists(selector: &str) -> String {
	let sel = literal(selector);
	format!(
		r#"(() => {{
				const sel = {sel};
				if (sel.startsWith('xpath=')) {{
					return {{ ok: document.evaluate(sel.slice(6), document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue !== null }};
				}}
				return {{ ok: document.querySelector(sel) !== null }};
			}})()"#
	)
}

pub fn matches_count(selector: &str) -> String {
	let sel = literal(selector);
	format!("(() => ({{ ok: document.querySelectorAll({sel}).length }}))()")
}

pub fn storage_get(local: bool, key: &str) -> String {
	let store = if local { "localStorage" } else { "sessionStorage" };
	let key = literal(key);
	format!("(() => ({{ ok: window.{store}.getItem({key}) }}))()")
}

pub fn storage_set(local: bool, key: &str, value: &str) -> String {
	let store = if local { "localStorage" } else { "sessionStorage" };
	let key = literal(key);
	let value = literal(value);
	format!(
		r#"(() => {{
				window.{store}.setItem({key}, {value});
				return {{ ok: true }};
			}})()"#
	)
}

pub fn storage_clear(local: bool) -> String {
	let store = if local { "localStorage" } else { "sessionStorage" };
	format!(
		r#"(() => {{
				window.{store}.clear();
				return {{ ok: true }};
			}})()"#
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn literal_escapes_quotes_and_newlines() {
		assert_eq!(literal("a'b\"c\nd"), "\"a'b\\\"c\\nd\"");
	}

	#[test]
	fn css_selector_is_embedded_as_json() {
		let script = click("button#b");
		assert!(script.contains("\"button#b\""));
		assert!(script.contains("querySelector"));
	}

	#[test]
	fn xpath_prefix_routes_through_document_evaluate() {
		let script = get_text("xpath=//div[@id='out']");
		assert!(script.contains("document.evaluate"));
	}

	#[test]
	fn type_text_respects_clear_flag() {
		assert!(type_text("#in", "hi", true).contains("el.value = '';"));
		assert!(!type_text("#in", "hi", false).contains("el.value = '';"));
	}
}
