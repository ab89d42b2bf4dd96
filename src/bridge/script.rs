//! Script injected into component markup to connect it to the bridge.
//!
//! The injected script exposes `window.sendToStreamlit(eventType, data)`,
//! which posts `{event, data, component, timestamp}` to the parent frame,
//! and calls `window.onStreamlitData(args)` with the render args of every
//! render message from an allowed origin.

/// Name of the send function the script defines.
pub const SEND_FUNCTION: &str = "sendToStreamlit";

/// Name of the receive hook the script calls if the component defines it.
pub const RECEIVE_FUNCTION: &str = "onStreamlitData";

const SAME_ORIGIN: &str = "window.location.origin";

/// Inject the bridge script into `html`.
///
/// The script goes right before the first `</body>` (any case), or at the
/// end when there is none. With no explicit origins (empty, or only `*`)
/// messages are restricted to the page's own origin.
pub fn wrap_with_bridge(html: &str, component: &str, allowed_origins: &[String]) -> String {
    let script = bridge_script(component, allowed_origins);

    match html.to_ascii_lowercase().find("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..idx]);
            out.push_str(&script);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{html}{script}"),
    }
}

/// Render the script for one component.
pub fn bridge_script(component: &str, allowed_origins: &[String]) -> String {
    let explicit: Vec<&str> = allowed_origins
        .iter()
        .map(String::as_str)
        .filter(|o| *o != "*")
        .collect();

    let (target_origin, origins) = if explicit.is_empty() {
        (SAME_ORIGIN.to_string(), SAME_ORIGIN.to_string())
    } else {
        let target = match allowed_origins.first().map(String::as_str) {
            Some("*") | None => SAME_ORIGIN.to_string(),
            Some(first) => js_string(first),
        };
        let list: Vec<String> = explicit.iter().map(|o| js_string(o)).collect();
        (target, list.join(", "))
    };

    let name = js_string(component);

    format!(
        r#"
<script>
(function() {{
    const COMPONENT_NAME = {name};
    const ALLOWED_ORIGINS = [{origins}];
    const TARGET_ORIGIN = {target_origin};

    function isOriginAllowed(origin) {{
        return ALLOWED_ORIGINS.includes(origin);
    }}

    window.{SEND_FUNCTION} = function(eventType, data) {{
        if (typeof eventType !== 'string') {{
            console.error('[Bridge] {SEND_FUNCTION}: eventType must be a string');
            return;
        }}
        if (!window.parent || window.parent === window) {{
            console.error('[Bridge] no parent frame');
            return;
        }}
        window.parent.postMessage({{
            type: 'streamlit:setComponentValue',
            value: {{
                event: eventType,
                data: data || {{}},
                component: COMPONENT_NAME,
                timestamp: Date.now()
            }}
        }}, TARGET_ORIGIN);
    }};

    window.addEventListener('message', function(event) {{
        if (!isOriginAllowed(event.origin)) {{
            console.warn('[Bridge] ignoring message from', event.origin);
            return;
        }}
        if (event.data && event.data.type === 'streamlit:render') {{
            if (typeof window.{RECEIVE_FUNCTION} === 'function') {{
                window.{RECEIVE_FUNCTION}(event.data.args);
            }}
        }}
    }});

    if (window.parent && window.parent !== window) {{
        window.parent.postMessage({{ type: 'streamlit:componentReady', apiVersion: 1 }}, TARGET_ORIGIN);
    }}
}})();
</script>
"#
    )
}

/// Quote `s` as a JavaScript string literal safe inside a `<script>` block.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string())
        .to_string()
        .replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inserted_before_body_close() {
        let html = "<html><BODY><p>hi</p></Body></html>";
        let wrapped = wrap_with_bridge(html, "card", &[]);

        let script_at = wrapped.find("<script>").unwrap();
        let body_close = wrapped.find("</Body>").unwrap();
        assert!(script_at < body_close);
        assert!(wrapped.starts_with("<html><BODY><p>hi</p>"));
        assert!(wrapped.ends_with("</Body></html>"));
    }

    #[test]
    fn test_appended_without_body() {
        let wrapped = wrap_with_bridge("<button>go</button>", "btn", &[]);
        assert!(wrapped.starts_with("<button>go</button>"));
        assert!(wrapped.trim_end().ends_with("</script>"));
    }

    #[test]
    fn test_default_origin_is_same_origin() {
        let script = bridge_script("btn", &["*".to_string()]);
        assert!(script.contains("const ALLOWED_ORIGINS = [window.location.origin];"));
        assert!(script.contains("const TARGET_ORIGIN = window.location.origin;"));
    }

    #[test]
    fn test_explicit_origins_are_quoted() {
        let origins = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let script = bridge_script("btn", &origins);
        assert!(script.contains(r#"const ALLOWED_ORIGINS = ["https://a.example", "https://b.example"];"#));
        assert!(script.contains(r#"const TARGET_ORIGIN = "https://a.example";"#));
    }

    #[test]
    fn test_component_name_cannot_break_out() {
        let script = bridge_script("x';</script><script>alert(1)//", &[]);
        assert!(!script.contains("</script><script>alert"));
        assert_eq!(script.matches("</script>").count(), 1);
    }

    #[test]
    fn test_exposes_contract_functions() {
        let script = bridge_script("btn", &[]);
        assert!(script.contains("window.sendToStreamlit = function(eventType, data)"));
        assert!(script.contains("window.onStreamlitData(event.data.args)"));
    }
}
