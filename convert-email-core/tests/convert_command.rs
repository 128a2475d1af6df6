#![cfg(unix)]
// Drives CommandConverter against a small shell stand-in for the conversion jar.

use convert_email_core::contract::{ConvertOptions, Converter};
use convert_email_core::convert::{CommandConverter, ConverterCommand};
use convert_email_core::error::ConversionError;
use std::fs;
use tempfile::tempdir;

/// Mimics the jar: writes `<stem>.pdf`, and with `-a` a `<stem>-attachments/` dir.
/// Inputs named `*fail*` exit non-zero, `*nopdf*` exit zero without output.
const FAKE_CONVERTER: &str = r#"
last=""
for arg in "$@"; do last="$arg"; done
case "${last##*/}" in
  *fail*) echo "cannot parse message" >&2; exit 3 ;;
  *nopdf*) exit 0 ;;
esac
base="${last%.*}"
printf '%%PDF-1.4' > "$base.pdf"
if [ "$1" = "-a" ]; then
  mkdir -p "$base-attachments"
  echo "hi" > "$base-attachments/note.txt"
fi
"#;

fn fake_converter() -> CommandConverter {
    CommandConverter::new(ConverterCommand {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            FAKE_CONVERTER.to_string(),
            "fake-converter".to_string(),
        ],
    })
}

#[tokio::test]
async fn test_successful_conversion_returns_sibling_pdf() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("hello.eml");
    fs::write(&input, b"Subject: hi\n\nbody").unwrap();

    let artifact = fake_converter()
        .convert(&input, &ConvertOptions::default())
        .await
        .expect("conversion should succeed");

    assert_eq!(artifact.pdf_path, tmp.path().join("hello.pdf"));
    assert!(artifact.pdf_path.is_file());
    assert!(artifact.attachment_dirs.is_empty());
}

#[tokio::test]
async fn test_attachment_extraction_reports_attachment_dirs() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("with files.msg");
    fs::write(&input, b"msg").unwrap();

    let artifact = fake_converter()
        .convert(
            &input,
            &ConvertOptions {
                extract_attachments: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        artifact.attachment_dirs,
        vec![tmp.path().join("with files-attachments")]
    );
    assert!(artifact.attachment_dirs[0].join("note.txt").is_file());
}

#[tokio::test]
async fn test_non_zero_exit_is_a_conversion_failure() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("fail.eml");
    fs::write(&input, b"garbage").unwrap();

    let err = fake_converter()
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap_err();

    match err {
        ConversionError::Failed { path, stderr, .. } => {
            assert_eq!(path, input);
            assert_eq!(stderr, "cannot parse message");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_pdf_is_a_conversion_failure() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("nopdf.eml");
    fs::write(&input, b"x").unwrap();

    let err = fake_converter()
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ConversionError::MissingOutput(p) if p == tmp.path().join("nopdf.pdf")));
}

#[tokio::test]
async fn test_missing_program_is_a_launch_failure() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("a.eml");
    fs::write(&input, b"x").unwrap();
    let converter = CommandConverter::new(ConverterCommand {
        program: "convert-email-no-such-program".to_string(),
        args: vec![],
    });

    let err = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ConversionError::Launch { .. }));
}
