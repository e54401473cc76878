//! Turning user-supplied file names into storage keys.

use uuid::Uuid;

const RESERVED_CHARS: [char; 8] = ['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Replace filesystem-hostile characters and `..` runs with `_`, then trim.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect();
    replaced.replace("..", "_").trim().to_string()
}

/// Lower-cased extension of `name` (alphanumeric only), if any.
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Derive the storage key for an upload.
///
/// `requested` is the explicit name field (may contain `/` for folder
/// uploads), `original` the payload's own file name. Only the base name is
/// sanitised; the directory part is kept minus empty, `.` and `..` segments.
/// When nothing usable survives a random name is generated, keeping the
/// extension of `original`.
pub fn derive_object_key(requested: Option<&str>, original: Option<&str>) -> String {
    let name = requested
        .filter(|n| !n.is_empty())
        .or(original)
        .unwrap_or_default();

    let (dir, base) = match name.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, name),
    };

    let folder = dir
        .map(|dir| {
            dir.split('/')
                .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    let mut base = sanitize_file_name(base);
    if base.is_empty() {
        base = match original.and_then(file_extension) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
    }

    if folder.is_empty() {
        base
    } else {
        format!("{folder}/{base}")
    }
}

/// MIME type for a key, by extension. Unknown extensions map to
/// `application/octet-stream`.
pub fn content_type_for(name: &str) -> &'static str {
    let Some(ext) = file_extension(name) else {
        return OCTET_STREAM;
    };
    match ext.as_str() {
        // documents
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        // images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        // video
        "mp4" => "video/mp4",
        // code
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "cpp" => "text/x-c++src",
        "cs" => "text/x-csharp",
        "m" => "text/x-matlab",
        // archives
        "zip" | "zipx" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",
        "bz2" => "application/x-bzip2",
        "xz" => "application/x-xz",
        // model weights and checkpoints (pt, pth, onnx, bin, h5, pb,
        // safetensors, ckpt, mat, gguf) are opaque binaries like anything else
        _ => OCTET_STREAM,
    }
}

pub const OCTET_STREAM: &str = "application/octet-stream";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_in_explicit_name_is_neutralised() {
        let key = derive_object_key(Some("../../etc/passwd"), Some("x.txt"));
        assert_eq!(key, "etc/passwd");

        let key = derive_object_key(Some("docs/..\\secret?.txt"), None);
        let base = key.rsplit('/').next().unwrap();
        assert!(!base.contains(".."));
        assert!(!base.contains(|c| RESERVED_CHARS.contains(&c)));
        assert!(key.starts_with("docs/"));
    }

    #[test]
    fn reserved_characters_become_underscores() {
        assert_eq!(sanitize_file_name("a:b*c?.txt"), "a_b_c_.txt");
        assert_eq!(sanitize_file_name("  spaced  "), "spaced");
        assert_eq!(sanitize_file_name("..."), "_.");
    }

    #[test]
    fn folder_upload_keeps_its_path() {
        let key = derive_object_key(Some("photos/2025/cat.jpg"), Some("cat.jpg"));
        assert_eq!(key, "photos/2025/cat.jpg");
    }

    #[test]
    fn falls_back_to_payload_file_name() {
        assert_eq!(derive_object_key(None, Some("report.pdf")), "report.pdf");
        assert_eq!(derive_object_key(Some(""), Some("report.pdf")), "report.pdf");
    }

    #[test]
    fn blank_base_name_gets_a_unique_random_name() {
        let a = derive_object_key(Some("dir/   "), Some("Photo.JPG"));
        let b = derive_object_key(Some("dir/   "), Some("Photo.JPG"));
        assert_ne!(a, b);
        assert!(a.starts_with("dir/"));
        assert!(a.ends_with(".jpg"));

        let bare = derive_object_key(Some("   "), None);
        assert!(Uuid::parse_str(&bare).is_ok());
    }

    #[test]
    fn content_type_lookup_by_extension() {
        assert_eq!(content_type_for("a/b/photo.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("model.safetensors"), OCTET_STREAM);
        assert_eq!(content_type_for("archive.tgz"), "application/gzip");
        assert_eq!(content_type_for("README"), OCTET_STREAM);
    }

    #[test]
    fn extension_requires_alphanumerics() {
        assert_eq!(file_extension("a.TXT"), Some("txt".into()));
        assert_eq!(file_extension("a.t-x"), None);
        assert_eq!(file_extension("noext"), None);
    }
}
