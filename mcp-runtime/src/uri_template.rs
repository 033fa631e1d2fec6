//! Level-1 URI-template matching for resource registrations.
//!
//! A template is a URI with zero or more `{variable}` segments. A template
//! without variables only matches itself. A variable captures a non-empty
//! run of characters and stops at the first occurrence of the literal text
//! that follows it in the template; a trailing variable captures the rest
//! of the URI.

use std::collections::HashMap;

pub fn is_template(template: &str) -> bool {
    template.contains('{')
}

pub fn match_uri(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let mut variables = HashMap::new();
    let mut rest = uri;
    let mut t = template;

    while let Some(open) = t.find('{') {
        let literal = &t[..open];
        rest = rest.strip_prefix(literal)?;

        let close = t[open..].find('}')? + open;
        let name = &t[open + 1..close];
        t = &t[close + 1..];

        let captured = match t.find('{') {
            // Up to the next literal run (or end of template).
            _ if t.is_empty() => {
                let all = rest;
                rest = "";
                all
            }
            Some(next_open) => {
                let stop = &t[..next_open];
                if stop.is_empty() {
                    // Adjacent variables are ambiguous; refuse the match.
                    return None;
                }
                let at = rest.find(stop)?;
                let (captured, tail) = rest.split_at(at);
                rest = tail;
                captured
            }
            None => {
                let at = rest.find(t)?;
                let (captured, tail) = rest.split_at(at);
                rest = tail;
                captured
            }
        };

        if captured.is_empty() {
            return None;
        }
        variables.insert(name.to_string(), captured.to_string());
    }

    if rest == t {
        Some(variables)
    } else {
        None
    }
}
