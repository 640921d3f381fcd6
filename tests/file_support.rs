//! Integration tests for per-format text extraction through `quotecmp extract`.
//!
//! Extraction is total: every input, including corrupt and unsupported
//! files, prints some text and exits successfully.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn quotecmp_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("quotecmp");
    path
}

/// Minimal valid PDF with one page of text.
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 48 >> stream\nBT /F1 12 Tf 100 700 Td (Premium 1200 USD) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Docx with a styled heading, a paragraph and a 2x2 table.
fn minimal_docx() -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();

        zip.start_file("word/styles.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style></w:styles>"#,
        )
        .unwrap();

        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Globex Policy</w:t></w:r></w:p>
<w:p><w:r><w:t>Annual premium quoted below.</w:t></w:r></w:p>
<w:tbl>
<w:tr><w:tc><w:p><w:r><w:t>Item</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Cost</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>Premium</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>1050</w:t></w:r></w:p></w:tc></w:tr>
</w:tbl>
</w:body></w:document>"#,
        )
        .unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn setup_file_support_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let config_path = root.join("quotecmp.toml");
    fs::write(
        &config_path,
        format!(
            "[paths]\ndata = {:?}\ncompletions = {:?}\n",
            data_dir.display().to_string(),
            root.join("completions").display().to_string()
        ),
    )
    .unwrap();

    (tmp, config_path, data_dir)
}

fn run_extract(config_path: &Path, file: &str) -> (String, String, bool) {
    let binary = quotecmp_binary();
    let mut cmd = Command::new(&binary);
    for (key, _) in std::env::vars() {
        if key.starts_with("AZURE_") || key.starts_with("MODEL_") {
            cmd.env_remove(key);
        }
    }
    let output = cmd
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["extract", file])
        .output()
        .unwrap_or_else(|e| panic!("Failed to run quotecmp binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn file_support_plain_text_and_json() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("acme.txt"), "Premium: $1,200").unwrap();
    fs::write(data_dir.join("acme.json"), r#"{"premium": 1200}"#).unwrap();

    let (stdout, stderr, success) = run_extract(&config_path, "acme.txt");
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.contains("Premium: $1,200"));

    let (stdout, _, success) = run_extract(&config_path, "acme.json");
    assert!(success);
    assert!(stdout.contains(r#"{"premium": 1200}"#));
}

#[test]
fn file_support_html_table_becomes_markdown() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(
        data_dir.join("globex.html"),
        "<h1>Globex</h1><table><thead><tr><th>Item</th><th>Cost</th></tr></thead><tbody><tr><td>Premium</td><td>1050</td></tr></tbody></table>",
    )
    .unwrap();

    let (stdout, stderr, success) = run_extract(&config_path, "globex.html");
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.contains("Globex"));
    assert!(stdout.contains("Premium"));
    assert!(stdout.contains("---"), "table separator missing: {}", stdout);
    assert!(!stdout.contains("<td>"));
}

#[test]
fn file_support_docx_headings_and_tables() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("globex.docx"), minimal_docx()).unwrap();

    let (stdout, stderr, success) = run_extract(&config_path, "globex.docx");
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.contains("Globex Policy"));
    assert!(stdout.contains("Annual premium quoted below."));
    assert!(stdout.contains("Premium"));
    assert!(stdout.contains("1050"));
}

#[test]
fn file_support_pdf_is_total() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("acme.pdf"), minimal_pdf_with_phrase()).unwrap();

    // The hand-built PDF may or may not yield text; extraction must not fail.
    let (_, stderr, success) = run_extract(&config_path, "acme.pdf");
    assert!(success, "extract failed: {}", stderr);
}

#[test]
fn file_support_corrupt_pdf_reports_error_text() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("bad.pdf"), b"not a valid pdf").unwrap();

    let (stdout, stderr, success) = run_extract(&config_path, "bad.pdf");
    assert!(success, "extract failed: {}", stderr);
    assert!(
        stdout.contains("Error extracting text from bad.pdf"),
        "stdout: {}",
        stdout
    );
}

#[test]
fn file_support_corrupt_docx_reports_error_text() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("bad.docx"), b"PK but not really").unwrap();

    let (stdout, _, success) = run_extract(&config_path, "bad.docx");
    assert!(success);
    assert!(stdout.contains("Error extracting text from bad.docx"));
}

#[test]
fn file_support_unsupported_extension() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("quote.xyz"), b"data").unwrap();

    let (stdout, _, success) = run_extract(&config_path, "quote.xyz");
    assert!(success);
    assert!(stdout.contains("Unsupported file type: .xyz"));
}

#[test]
fn file_support_remote_only_format_without_service() {
    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("scan.PNG"), b"\x89PNG").unwrap();

    let (stdout, _, success) = run_extract(&config_path, "scan.PNG");
    assert!(success);
    assert!(
        stdout.contains("This file format (.png) requires Azure Document Intelligence"),
        "stdout: {}",
        stdout
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_support_remote_service_used_when_configured() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/documentintelligence/documentModels/prebuilt-layout:analyze",
        ))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Operation-Location", format!("{}/ops/7", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ops/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "succeeded",
            "analyzeResult": {"content": "# Scanned quote\n\nPremium 900"}
        })))
        .mount(&server)
        .await;

    let (_tmp, config_path, data_dir) = setup_file_support_env();
    fs::write(data_dir.join("scan.png"), b"\x89PNG").unwrap();
    let mut config = fs::read_to_string(&config_path).unwrap();
    config.push_str(&format!(
        "\n[extraction]\nendpoint = {:?}\napi_key = \"di-key\"\npoll_interval_ms = 0\n",
        server.uri()
    ));
    fs::write(&config_path, config).unwrap();

    let (stdout, stderr, success) =
        tokio::task::spawn_blocking(move || run_extract(&config_path, "scan.png"))
            .await
            .unwrap();
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.contains("# Scanned quote"), "stdout: {}", stdout);
}
