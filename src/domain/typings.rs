//! Type-declaration package naming and version range checks

use semver::VersionReq;

/// Scope every type-declaration package lives under
pub const TYPES_SCOPE: &str = "@types/";

/// True if `name` is itself a type-declaration package
pub fn is_typings_package(name: &str) -> bool {
    name.starts_with(TYPES_SCOPE)
}

/// Name of the type-declaration package for `name`.
///
/// Scoped packages are mangled the DefinitelyTyped way:
/// `@babel/core` becomes `@types/babel__core`.
pub fn typings_package_for(name: &str) -> String {
    match name.strip_prefix('@').and_then(|scoped| scoped.split_once('/')) {
        Some((scope, package)) => format!("{}{}__{}", TYPES_SCOPE, scope, package),
        None => format!("{}{}", TYPES_SCOPE, name),
    }
}

/// True if `range` is a version or version range a registry can resolve.
///
/// Git URLs, tarball and file paths, `owner/repo` shorthands, aliases and
/// dist-tags are rejected. The empty range means "any version".
pub fn is_registry_range(range: &str) -> bool {
    let range = range.trim();
    if range.is_empty() {
        return true;
    }
    range.split("||").all(|set| comparator_set(set.trim()).is_some())
}

/// Parses one `||` alternative written in npm syntax
fn comparator_set(set: &str) -> Option<VersionReq> {
    if set.is_empty() {
        return Some(VersionReq::STAR);
    }

    // "1.2.3 - 2.3.4" hyphen ranges
    if let Some((low, high)) = set.split_once(" - ") {
        let req = format!(">={}, <={}", strip_v(low.trim()), strip_v(high.trim()));
        return VersionReq::parse(&req).ok();
    }

    let mut comparators = Vec::new();
    let mut operator = String::new();
    for token in set.split_whitespace() {
        if token.chars().all(is_operator) {
            // ">= 1.2.3" splits the operator from its version
            operator.push_str(token);
            continue;
        }
        comparators.push(format!("{}{}", std::mem::take(&mut operator), strip_v(token)));
    }
    if !operator.is_empty() {
        return None;
    }

    VersionReq::parse(&comparators.join(", ")).ok()
}

fn is_operator(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '~' | '^')
}

/// Drops the `v` npm tolerates in front of a version (`^v1.2.0`)
fn strip_v(comparator: &str) -> String {
    let split = comparator
        .find(|c: char| !is_operator(c))
        .unwrap_or(comparator.len());
    let (op, version) = comparator.split_at(split);
    let version = version
        .strip_prefix(['v', 'V'])
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(version);
    format!("{}{}", op, version)
}
