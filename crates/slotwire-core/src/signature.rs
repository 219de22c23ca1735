//! Method signature strings.
//!
//! A signature is `name(T1,T2,...)` where each `Ti` is the short type name
//! of a parameter. Lookups try the caller's string verbatim first and fall
//! back to its normalized form, so `"value_changed( i32 )"` resolves the
//! same method as `"value_changed(i32)"`.

use crate::types::TypeTag;

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Remove insignificant whitespace from a signature.
///
/// Whitespace is kept (collapsed to one space) only where it separates two
/// identifier characters, e.g. `dyn Fn`.
#[must_use]
pub fn normalize_signature(signature: &str) -> String {
    let mut out = String::with_capacity(signature.len());
    let mut pending_space = false;
    for c in signature.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space && is_ident(c) && out.chars().last().is_some_and(is_ident) {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Build the canonical signature for `name` taking `params`.
#[must_use]
pub fn make_signature(name: &str, params: &[TypeTag]) -> String {
    let params: Vec<String> = params.iter().map(TypeTag::name).collect();
    normalize_signature(&format!("{name}({})", params.join(",")))
}

/// The method name part of a signature (everything before `(`).
#[must_use]
pub fn method_name(signature: &str) -> &str {
    signature
        .split_once('(')
        .map_or(signature, |(name, _)| name)
        .trim()
}
