//! Configuration page template and form decoding
//!
//! The page is plain HTML with `{{BUTTON_n_FIELD}}` placeholders. The form
//! posts back one field per placeholder; missing fields read as empty text
//! or 0, and the repeat checkbox is on only when its value is `"1"`.

use crate::button::{ButtonId, ButtonUpdate, ButtonView};
use crate::command::lenient_int;
use std::collections::HashMap;

/// Built-in page used when no template file is configured
pub const DEFAULT_TEMPLATE: &str = include_str!("../../assets/index.html");

/// Replace every placeholder of every button
pub fn render(template: &str, views: &[ButtonView]) -> String {
    let mut page = template.to_string();
    for view in views {
        let n = view.button.number();
        let fields = [
            ("PUSH", escape(&view.push)),
            ("HOLD", escape(&view.hold)),
            ("DOUBLE_PUSH", escape(&view.double_push)),
            ("REPEAT_FLAG", view.repeat_flag_checked().to_string()),
            ("VAR_MIN", view.var_min.to_string()),
            ("VAR_MAX", view.var_max.to_string()),
            ("VAR_VALUE", view.var_value.to_string()),
        ];
        for (field, value) in fields {
            page = page.replace(&format!("{{{{BUTTON_{}_{}}}}}", n, field), &value);
        }
    }
    page
}

/// Decode a submitted form into one update per button
pub fn updates_from_form(form: &HashMap<String, String>) -> Vec<(ButtonId, ButtonUpdate)> {
    ButtonId::all()
        .map(|id| {
            let field = |name: &str| {
                form.get(&format!("BUTTON_{}_{}", id.number(), name))
                    .map(String::as_str)
                    .unwrap_or("")
            };
            let update = ButtonUpdate {
                push: field("PUSH").to_string(),
                hold: field("HOLD").to_string(),
                double_push: field("DOUBLE_PUSH").to_string(),
                repeat_on_hold: field("REPEAT_FLAG") == "1",
                var_min: lenient_int(field("VAR_MIN")),
                var_max: lenient_int(field("VAR_MAX")),
                var_value: lenient_int(field("VAR_VALUE")),
            };
            (id, update)
        })
        .collect()
}

/// Escape text placed inside an HTML attribute or element
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(n: u8) -> ButtonView {
        ButtonView {
            button: ButtonId::new(n).unwrap(),
            push: "CC 1 80 127".to_string(),
            hold: String::new(),
            double_push: "VAR_DEC 1 1 0".to_string(),
            repeat_on_hold: n == 5,
            var_min: 0,
            var_max: 56,
            var_value: 23,
        }
    }

    #[test]
    fn test_render_replaces_placeholders() {
        let template = "<input value=\"{{BUTTON_5_PUSH}}\" {{BUTTON_5_REPEAT_FLAG}}>\
                        {{BUTTON_5_VAR_VALUE}}/{{BUTTON_1_REPEAT_FLAG}}/{{BUTTON_1_HOLD}}.";
        let page = render(template, &[view(1), view(5)]);
        assert_eq!(page, "<input value=\"CC 1 80 127\" checked>23//.");
    }

    #[test]
    fn test_default_template_has_every_placeholder() {
        let views: Vec<_> = (1..=6).map(view).collect();
        let page = render(DEFAULT_TEMPLATE, &views);
        assert!(!page.contains("{{BUTTON_"));
    }

    #[test]
    fn test_render_escapes_markup() {
        let mut v = view(2);
        v.push = "\"><script>".to_string();
        let page = render("{{BUTTON_2_PUSH}}", &[v]);
        assert_eq!(page, "&quot;&gt;&lt;script&gt;");
    }

    #[test]
    fn test_form_decoding() {
        let mut form = HashMap::new();
        form.insert("BUTTON_3_PUSH".to_string(), "CC 1 83 127".to_string());
        form.insert("BUTTON_3_REPEAT_FLAG".to_string(), "1".to_string());
        form.insert("BUTTON_3_VAR_MAX".to_string(), "99".to_string());
        form.insert("BUTTON_4_REPEAT_FLAG".to_string(), "on".to_string());

        let updates = updates_from_form(&form);
        assert_eq!(updates.len(), 6);

        let (id, b3) = &updates[2];
        assert_eq!(id.number(), 3);
        assert_eq!(b3.push, "CC 1 83 127");
        assert!(b3.repeat_on_hold);
        assert_eq!(b3.var_max, 99);
        assert_eq!(b3.var_min, 0);
        assert_eq!(b3.hold, "");

        assert!(!updates[3].1.repeat_on_hold);
    }
}
