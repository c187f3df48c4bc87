use std::path::{Component, Path, PathBuf};

/// Filändelse som används när filnamnet saknar en
pub const DEFAULT_EXTENSION: &str = "pdf";

/// Hämta konfigurationssökväg
pub fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("se", "toolpack", "Toolpack")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from("settings.toml"))
}

/// Skapa en säker filnamn från en sträng
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Hämta filändelse
pub fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
}

/// Filändelse för en bilaga, "pdf" om filnamnet saknar ändelse
pub fn extension_of(file_name: &str) -> String {
    get_extension(Path::new(file_name))
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Kontrollera om en fil är PDF
pub fn is_pdf_file(path: &Path) -> bool {
    matches!(get_extension(path).as_deref(), Some("pdf"))
}

/// Kontrollera om en fil har toolpack-ändelse
pub fn is_toolpack_file(name: &str) -> bool {
    matches!(get_extension(Path::new(name)).as_deref(), Some("toolpack"))
}

/// Relativ sökväg utan `..`, rotkomponenter eller tomma segment
pub fn is_safe_relative_path(relative: &str) -> bool {
    if relative.is_empty() || relative.contains('\\') {
        return false;
    }
    if relative.split('/').any(|segment| segment.is_empty() || segment == ".") {
        return false;
    }
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("hello world"), "hello world");
        assert_eq!(sanitize_filename("hello/world"), "hello_world");
        assert_eq!(sanitize_filename("file:name"), "file_name");
        assert_eq!(sanitize_filename("test<>file"), "test__file");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.pdf"), "pdf");
        assert_eq!(extension_of("Manual.PDF"), "pdf");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "pdf");
        assert_eq!(extension_of(""), "pdf");
    }

    #[test]
    fn test_is_toolpack_file() {
        assert!(is_toolpack_file("library.toolpack"));
        assert!(is_toolpack_file("LIBRARY.TOOLPACK"));
        assert!(!is_toolpack_file("library.sqlite"));
    }

    #[test]
    fn test_is_safe_relative_path() {
        assert!(is_safe_relative_path("ab/abcdef.pdf"));
        assert!(!is_safe_relative_path("../etc/passwd"));
        assert!(!is_safe_relative_path("/abs/path.pdf"));
        assert!(!is_safe_relative_path("ab/../../x.pdf"));
        assert!(!is_safe_relative_path("ab\\x.pdf"));
        assert!(!is_safe_relative_path(""));
        assert!(!is_safe_relative_path("ab//x.pdf"));
        assert!(!is_safe_relative_path("ab/./x.pdf"));
    }
}
