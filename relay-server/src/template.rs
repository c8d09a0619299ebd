//! Message template tags.
//!
//! Templates use a fixed set of bracketed tags. Substitution is a single
//! left-to-right pass, so text inserted for one tag is never rescanned.

use std::collections::HashMap;

/// Tag → field name. `[msg]` and `[title]` are aliases.
const TAGS: &[(&str, &str)] = &[
    ("[from]", "from"),
    ("[content]", "content"),
    ("[msg]", "content"),
    ("[timestamp]", "timestamp"),
    ("[sign]", "sign"),
    ("[device_mark]", "device_mark"),
    ("[app_version]", "app_version"),
    ("[card_slot]", "card_slot"),
    ("[title]", "card_slot"),
    ("[receive_time]", "receive_time"),
];

/// Fill `template` from `fields`. Missing fields become the empty string.
pub fn substitute(template: &str, fields: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        match TAGS.iter().find(|(tag, _)| rest.starts_with(tag)) {
            Some((tag, field)) => {
                if let Some(value) = fields.get(*field) {
                    out.push_str(value);
                }
                rest = &rest[tag.len()..];
            }
            None => {
                out.push('[');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
