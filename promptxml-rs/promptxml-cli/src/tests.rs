use super::*;
use promptxml_config::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use promptxml_document::DEFAULT_SCHEMA_LOCATION;
use promptxml_parser::FormatError;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

static TEST_MUTEX: Mutex<()> = Mutex::new(());

const CAT_PROMPT: &str = "A cat\nNegative prompt: blurry\nSteps: 20, Sampler: Euler, CFG scale: 7, Seed: 123, Width: 512, Height: 512";

fn with_isolated_home<F>(func: F)
where
    F: FnOnce(&Path),
{
    let _guard = TEST_MUTEX.lock().unwrap();
    let temp_home = TempDir::new().expect("create temp home");
    let snapshot = EnvSnapshot::capture();
    set_home_env(temp_home.path());

    func(temp_home.path());

    snapshot.restore();
}

fn set_home_env(path: &Path) {
    set_env("HOME", path.as_os_str());
    set_env("USERPROFILE", path.as_os_str());
}

struct EnvSnapshot {
    home: Option<OsString>,
    userprofile: Option<OsString>,
}

impl EnvSnapshot {
    fn capture() -> Self {
        Self {
            home: std::env::var_os("HOME"),
            userprofile: std::env::var_os("USERPROFILE"),
        }
    }

    fn restore(self) {
        if let Some(value) = self.home {
            set_env("HOME", &value);
        } else {
            remove_env("HOME");
        }

        if let Some(value) = self.userprofile {
            set_env("USERPROFILE", &value);
        } else {
            remove_env("USERPROFILE");
        }
    }
}

fn set_env(key: &str, value: &OsStr) {
    // SAFETY: environment access is serialized by TEST_MUTEX and the values
    // are temp paths without interior null bytes.
    unsafe { std::env::set_var(key, value) };
}

fn remove_env(key: &str) {
    unsafe { std::env::remove_var(key) };
}

fn cli_for(dir: &Path, text: &str) -> Cli {
    let text_prompt_path = dir.join("prompt.txt");
    fs::write(&text_prompt_path, text).expect("write text prompt");
    Cli {
        text_prompt_path,
        xml_prompt_path: dir.join("prompt.xml"),
    }
}

#[test]
fn cli_accepts_two_positional_paths() {
    let cli = Cli::try_parse_from(["promptxml", "in.txt", "out.xml"]).expect("parse args");
    assert_eq!(cli.text_prompt_path, PathBuf::from("in.txt"));
    assert_eq!(cli.xml_prompt_path, PathBuf::from("out.xml"));

    assert!(Cli::try_parse_from(["promptxml", "in.txt"]).is_err());
    assert!(Cli::try_parse_from(["promptxml", "in.txt", "out.xml", "--indent", "4"]).is_err());
}

#[test]
fn run_converts_prompt_without_touching_home() {
    with_isolated_home(|home| {
        let work = TempDir::new().expect("create work dir");
        let cli = cli_for(work.path(), CAT_PROMPT);
        let output = cli.xml_prompt_path.clone();

        let report = run(cli).expect("run succeeds");

        assert!(report.warnings.is_empty());
        assert_eq!(
            fs::read_dir(home).expect("read home").count(),
            0,
            "conversion must only write the output file"
        );
        assert!(report.infos.iter().any(|info| info.ends_with(
            "(image parameters: width, height, steps, sampler, cfg-scale, seed)"
        )));

        let xml = fs::read_to_string(&output).expect("read output");
        assert!(xml.contains(DEFAULT_SCHEMA_LOCATION));
        assert!(xml.contains("<positive-prompt>A cat</positive-prompt>"));
        assert!(xml.contains("<negative-prompt>blurry</negative-prompt>"));
        assert!(xml.contains("<cfg-scale>7</cfg-scale>"));
    });
}

#[test]
fn rendered_elements_follow_projection_order() {
    let prompt = parse("x\nSteps: 20, Clip skip: 2, Seed: 9, Basemodel: SDXL").expect("prompt parses");
    assert_eq!(rendered_elements(&prompt), vec!["steps", "seed", "clip-skip"]);
}

#[test]
fn run_uses_configured_schema_location() {
    with_isolated_home(|home| {
        let config_dir = home.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(
            config_dir.join(CONFIG_FILE_NAME),
            "schema_location = \"file:///local/civitai_prompt.xsd\"\n",
        )
        .expect("write config");

        let work = TempDir::new().expect("create work dir");
        let cli = cli_for(work.path(), "A cat\nSteps: 20");
        let output = cli.xml_prompt_path.clone();

        let report = run(cli).expect("run succeeds");
        assert!(
            report
                .infos
                .iter()
                .any(|info| info.starts_with("Using promptxml configuration"))
        );

        let xml = fs::read_to_string(&output).expect("read output");
        assert!(xml.contains("xsi:noNamespaceSchemaLocation=\"file:///local/civitai_prompt.xsd\""));
        assert!(!xml.contains("negative-prompt"));
    });
}

#[test]
fn run_falls_back_to_defaults_when_config_is_malformed() {
    with_isolated_home(|home| {
        let config_dir = home.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(config_dir.join(CONFIG_FILE_NAME), "indent_width = [").expect("write config");

        let work = TempDir::new().expect("create work dir");
        let cli = cli_for(work.path(), CAT_PROMPT);
        let output = cli.xml_prompt_path.clone();

        let report = run(cli).expect("run succeeds with defaults");
        assert!(
            report
                .warnings
                .iter()
                .any(|warning| warning.contains("Falling back to defaults"))
        );

        let xml = fs::read_to_string(&output).expect("read output");
        assert!(xml.contains(DEFAULT_SCHEMA_LOCATION));
    });
}

#[test]
fn run_rejects_oversized_indent_width_and_uses_defaults() {
    with_isolated_home(|home| {
        let config_dir = home.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(
            config_dir.join(CONFIG_FILE_NAME),
            format!("indent_width = {}\n", i64::MAX),
        )
        .expect("write config");

        let work = TempDir::new().expect("create work dir");
        let cli = cli_for(work.path(), CAT_PROMPT);
        let output = cli.xml_prompt_path.clone();

        let report = run(cli).expect("run succeeds with defaults");
        assert!(
            report
                .warnings
                .iter()
                .any(|warning| warning.contains("indent_width must be at most"))
        );

        let xml = fs::read_to_string(&output).expect("read output");
        assert!(xml.contains("\n  <prompt-details>"));
    });
}

#[test]
fn run_fails_on_missing_input() {
    with_isolated_home(|_| {
        let work = TempDir::new().expect("create work dir");
        let cli = Cli {
            text_prompt_path: work.path().join("missing.txt"),
            xml_prompt_path: work.path().join("prompt.xml"),
        };

        let error = run(cli).expect_err("missing input");
        assert!(matches!(
            error.downcast_ref::<InputError>(),
            Some(InputError::Read { .. })
        ));
        assert!(error.to_string().contains("missing.txt"));
        assert!(!work.path().join("prompt.xml").exists());
    });
}

#[test]
fn run_fails_without_steps_marker() {
    with_isolated_home(|_| {
        let work = TempDir::new().expect("create work dir");
        let cli = cli_for(work.path(), "A cat\nNegative prompt: blurry\n");
        let output = cli.xml_prompt_path.clone();

        let error = run(cli).expect_err("missing steps marker");
        assert_eq!(
            error.downcast_ref::<FormatError>(),
            Some(&FormatError::MissingStepsMarker)
        );
        assert!(!output.exists());
    });
}
