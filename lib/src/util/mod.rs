mod macros;
pub mod fs;

pub use macros::*;

use std::cmp::Ordering;
use std::path::Path;

/// Makes `string` usable as a file name: surrounding whitespace is trimmed,
/// inner spaces become `_`, and anything that is not a word character, `-`
/// or `.` is dropped. Non-ASCII letters and digits are kept.
pub fn valid_filename(string: &str) -> String {
    string.trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            '-' | '.' | '_' => Some(c),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        })
        .collect()
}

/// Case-insensitive ordering, ties broken by the exact string so that the
/// result is total and stable across runs.
pub fn cmp_ci(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

pub fn sort_ci<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by(|a, b| cmp_ci(a.as_ref(), b.as_ref()));
}

/// `foo.adoc` -> `foo.html`.
pub fn html_name(doc: &str) -> String {
    let stem = doc.strip_suffix(".adoc").unwrap_or(doc);
    format!("{stem}.html")
}

/// `foo.html` -> `foo.adoc`.
pub fn adoc_name(page: &str) -> String {
    let stem = page.strip_suffix(".html").unwrap_or(page);
    format!("{stem}.adoc")
}

/// The file name of `path` as a string, lossily.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod util_tests {
    use super::*;

    #[test]
    fn test_valid_filename() {
        assert_eq!(valid_filename("  Category "), "Category");
        assert_eq!(valid_filename("my key"), "my_key");
        assert_eq!(valid_filename("C/C++ & Rust!"), "CC__Rust");
        assert_eq!(valid_filename("v1.2-beta"), "v1.2-beta");
        assert_eq!(valid_filename("Año nuevo"), "Año_nuevo");
        assert_eq!(valid_filename("../../etc"), "....etc");
    }

    #[test]
    fn test_sort_ci() {
        let mut v = vec!["b", "A", "a", "C"];
        sort_ci(&mut v);
        assert_eq!(v, ["A", "a", "b", "C"]);
    }

    #[test]
    fn test_page_names() {
        assert_eq!(html_name("a.adoc"), "a.html");
        assert_eq!(html_name("Category_X"), "Category_X.html");
        assert_eq!(adoc_name("index.html"), "index.adoc");
    }
}
