use crate::core::BrowserTrait;
use crate::errors::{Result, SnapshotError};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Serializes the live document (layout, computed style, form state and
/// same-origin child frames) as a JSON string in `DocumentSpec` shape.
/// Password values never leave the page. Past the node budget the walk stops
/// and the document reports `truncatedAt`.
pub const CAPTURE_SCRIPT: &str = r#"
(function() {
    const MAX_NODES = 20000;
    const SKIP_TEXT = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE']);
    const HANDLERS = ['click', 'mousedown', 'mouseup', 'pointerdown', 'pointerup', 'keydown', 'keyup', 'keypress'];
    let budget = MAX_NODES;
    let truncated = false;

    function styleOf(el, win) {
        const s = win.getComputedStyle(el);
        return {
            display: s.display,
            visibility: s.visibility,
            opacity: parseFloat(s.opacity || '1'),
            zIndex: s.zIndex,
            position: s.position,
            backgroundColor: s.backgroundColor,
            color: s.color,
            cursor: s.cursor,
            fontWeight: s.fontWeight,
            fontSize: s.fontSize,
            pointerEvents: s.pointerEvents,
            fill: s.fill || null,
            stroke: s.stroke || null
        };
    }

    function frameOf(el) {
        let doc = null;
        try {
            doc = el.contentDocument;
        } catch (e) {
            return { kind: 'cross_origin' };
        }
        if (!doc) return { kind: 'cross_origin' };
        if (!doc.documentElement) return { kind: 'not_loaded' };
        return { kind: 'same_origin', document: documentOf(doc) };
    }

    function nodeOf(node, win) {
        if (budget-- <= 0) {
            truncated = true;
            return null;
        }
        if (node.nodeType === Node.TEXT_NODE) {
            const text = node.textContent;
            if (!text || !text.trim()) return null;
            return { tag: '#text', text: text };
        }
        if (node.nodeType !== Node.ELEMENT_NODE) return null;

        const el = node;
        const tag = el.tagName.toLowerCase();
        const isPassword = tag === 'input' && (el.getAttribute('type') || '').toLowerCase() === 'password';
        const attrs = {};
        for (const attr of el.attributes) {
            if (isPassword && attr.name === 'value') continue;
            attrs[attr.name] = attr.value;
        }
        const r = el.getBoundingClientRect();
        const out = {
            tag: tag,
            attrs: attrs,
            style: styleOf(el, win),
            rect: { x: r.x, y: r.y, width: r.width, height: r.height },
            children: [],
            shadow: [],
            listeners: HANDLERS.filter(h => typeof el['on' + h] === 'function'),
            connected: el.isConnected
        };
        if ((tag === 'input' || tag === 'textarea' || tag === 'select') && !isPassword) {
            out.value = el.value;
        }
        if (tag === 'input' && (el.type === 'checkbox' || el.type === 'radio')) {
            out.checked = el.checked;
        }
        if (tag === 'iframe' || tag === 'frame') {
            out.frame = frameOf(el);
        }
        if (el.shadowRoot) {
            for (const child of el.shadowRoot.childNodes) {
                const spec = nodeOf(child, win);
                if (spec) out.shadow.push(spec);
            }
        }
        const skipText = SKIP_TEXT.has(el.tagName);
        for (const child of el.childNodes) {
            if (skipText && child.nodeType === Node.TEXT_NODE) continue;
            const spec = nodeOf(child, win);
            if (spec) out.children.push(spec);
        }
        return out;
    }

    function documentOf(doc) {
        const win = doc.defaultView || window;
        return {
            url: doc.location ? doc.location.href : 'about:blank',
            viewport: { width: win.innerWidth, height: win.innerHeight },
            scrollY: win.scrollY || 0,
            readyState: doc.readyState,
            root: nodeOf(doc.documentElement, win),
            truncatedAt: truncated ? MAX_NODES : null
        };
    }

    try {
        return JSON.stringify(documentOf(document));
    } catch (e) {
        return JSON.stringify({ error: String(e && e.message || e) });
    }
})()
"#;

pub const SCROLL_Y_SCRIPT: &str = "JSON.stringify(window.scrollY || 0)";

pub fn scroll_to_script(y: f64) -> String {
    format!(
        "(function() {{ window.scrollTo(0, {}); return JSON.stringify({{ scrollY: window.scrollY }}); }})()",
        y
    )
}

pub struct JavaScriptRunner;

impl JavaScriptRunner {
    pub async fn execute<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        script: &str,
    ) -> Result<Value> {
        browser.execute_script(tab, script).await
    }

    pub async fn execute_with_timeout<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        script: &str,
        timeout_ms: u64,
    ) -> Result<Value> {
        let execution = browser.execute_script(tab, script);

        tokio::time::timeout(tokio::time::Duration::from_millis(timeout_ms), execution)
            .await
            .map_err(|_| SnapshotError::JavaScriptTimeout)?
    }

    /// Scripts return `JSON.stringify(..)` so results survive the protocol
    /// as a plain string; an `{ "error": .. }` payload is a script failure.
    pub async fn evaluate_json<B: BrowserTrait, T: DeserializeOwned>(
        browser: &B,
        tab: &B::TabHandle,
        script: &str,
        timeout_ms: u64,
    ) -> Result<T> {
        let result = Self::execute_with_timeout(browser, tab, script, timeout_ms).await?;
        let value = match result {
            Value::String(json) => serde_json::from_str::<Value>(&json)?,
            other => other,
        };
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(SnapshotError::JavaScriptFailed(message.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}
