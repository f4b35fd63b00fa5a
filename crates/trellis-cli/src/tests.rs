//! Unit tests for the administration command runner.

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use rstest::{fixture, rstest};

use camino::Utf8PathBuf;
use trellis_config::Config;
use trellis_extensions::manager::ExtensionManagerBuilder;
use trellis_extensions::provider::{Extension, ExtensionProvider};
use trellis_extensions::{ExtensionError, ExtensionManager, ExtensionManifest, ExtensionMetadata};

use super::{run, run_host};

struct StubExtension;
impl Extension for StubExtension {}

struct StubProvider {
    manifest: ExtensionManifest,
    media: Option<Utf8PathBuf>,
}

impl ExtensionProvider for StubProvider {
    fn id(&self) -> &str {
        self.manifest.id()
    }

    fn manifest(&self) -> Result<ExtensionManifest, ExtensionError> {
        Ok(self.manifest.clone())
    }

    fn construct(&self) -> Result<Box<dyn Extension>, ExtensionError> {
        Ok(Box::new(StubExtension))
    }

    fn media_source(&self) -> Option<Utf8PathBuf> {
        self.media.clone()
    }
}

fn manifest(id: &str) -> ExtensionManifest {
    ExtensionManifest::new(ExtensionMetadata::new(id, id, "1.0.0", "ACME"))
}

struct CliWorld {
    manager: ExtensionManager,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    _tmp: Option<tempfile::TempDir>,
}

impl CliWorld {
    fn run(&mut self, args: &[&str]) -> ExitCode {
        run(&self.manager, args.iter().copied(), &mut self.stdout, &mut self.stderr)
    }

    fn stdout_text(&self) -> String {
        String::from_utf8(self.stdout.clone()).expect("stdout should be UTF-8")
    }

    fn stderr_text(&self) -> String {
        String::from_utf8(self.stderr.clone()).expect("stderr should be UTF-8")
    }
}

#[fixture]
fn world() -> CliWorld {
    let manager = ExtensionManagerBuilder::new(Config::default())
        .build()
        .expect("manager should build");
    manager
        .register_provider(Arc::new(StubProvider {
            manifest: manifest("reports"),
            media: None,
        }))
        .expect("provider should register");
    manager
        .register_provider(Arc::new(StubProvider {
            manifest: manifest("audit"),
            media: None,
        }))
        .expect("provider should register");
    manager.load(false).expect("load should succeed");

    CliWorld {
        manager,
        stdout: Vec::new(),
        stderr: Vec::new(),
        _tmp: None,
    }
}

/// World whose manager copies media into a temp directory.
fn media_world() -> CliWorld {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let base = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .expect("temp path should be UTF-8");
    let mut config = Config::default();
    config.set_manage_media(true);
    config.set_media_root(Some(base.join("media")));
    config.set_lock_dir(base.join("locks"));

    let source = base.join("pkg-static");
    fs::create_dir_all(source.as_std_path()).expect("create source dir");
    fs::write(source.join("style.css").as_std_path(), "body {}").expect("write source file");

    let manager = ExtensionManagerBuilder::new(config)
        .build()
        .expect("manager should build");
    manager
        .register_provider(Arc::new(StubProvider {
            manifest: manifest("reports"),
            media: Some(source),
        }))
        .expect("provider should register");
    manager.load(false).expect("load should succeed");
    manager
        .enable_extension("reports")
        .expect("enable should succeed");

    CliWorld {
        manager,
        stdout: Vec::new(),
        stderr: Vec::new(),
        _tmp: Some(tmp),
    }
}

// -- list ------------------------------------------------------------------

#[rstest]
fn list_shows_each_extension_with_its_state(mut world: CliWorld) {
    world
        .manager
        .enable_extension("reports")
        .expect("enable should succeed");

    let exit = world.run(&["trellis", "list"]);
    assert_eq!(exit, ExitCode::SUCCESS);
    let output = world.stdout_text();
    assert!(output.contains("reports (enabled)"));
    assert!(output.contains("audit (disabled)"));
}

// -- install-media ---------------------------------------------------------

#[test]
fn install_media_for_one_extension_reports_the_install() {
    let mut world = media_world();
    // Enabling already installed this version; force a clean re-copy.
    let exit = world.run(&[
        "trellis",
        "install-media",
        "--extension-id",
        "reports",
        "--force",
    ]);
    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(world.stdout_text().contains("installed media for 'reports'"));
}

#[test]
fn install_media_without_force_is_already_current() {
    let mut world = media_world();
    let exit = world.run(&["trellis", "install-media", "--extension-id", "reports"]);
    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(world.stdout_text().contains("already current"));
}

#[test]
fn install_media_covers_all_enabled_extensions() {
    let mut world = media_world();
    let exit = world.run(&["trellis", "install-media", "--force"]);
    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(world.stdout_text().contains("installed media for 'reports'"));
}

#[rstest]
fn install_media_for_unknown_extension_fails(mut world: CliWorld) {
    let exit = world.run(&["trellis", "install-media", "--extension-id", "ghost"]);
    assert_eq!(exit, ExitCode::FAILURE);
    assert!(world.stderr_text().contains("ghost"));
}

#[test]
fn media_disabled_host_skips_the_install() {
    // The provider ships media but the host serves assets from source.
    let manager = ExtensionManagerBuilder::new(Config::default())
        .build()
        .expect("manager should build");
    manager
        .register_provider(Arc::new(StubProvider {
            manifest: manifest("reports"),
            media: Some(Utf8PathBuf::from("/srv/pkg-static")),
        }))
        .expect("provider should register");
    manager.load(false).expect("load should succeed");
    manager
        .enable_extension("reports")
        .expect("enable should succeed");
    let mut world = CliWorld {
        manager,
        stdout: Vec::new(),
        stderr: Vec::new(),
        _tmp: None,
    };

    let exit = world.run(&["trellis", "install-media"]);
    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(world.stdout_text().contains("media management is disabled"));
}

// -- host entry point ------------------------------------------------------

#[rstest]
fn run_host_brings_up_telemetry_and_runs_the_command(mut world: CliWorld) {
    let config = Config::default();
    let exit = run_host(
        &config,
        &world.manager,
        ["trellis", "list"],
        &mut world.stdout,
        &mut world.stderr,
    );
    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(world.stdout_text().contains("reports (disabled)"));

    // Telemetry is already installed; a second invocation still works.
    let again = run_host(
        &config,
        &world.manager,
        ["trellis", "list"],
        &mut world.stdout,
        &mut world.stderr,
    );
    assert_eq!(again, ExitCode::SUCCESS);
}

#[rstest]
fn run_host_rejects_a_bad_log_filter(mut world: CliWorld) {
    let config = Config::from_toml(r#"log_filter = "trellis=notalevel""#)
        .expect("document should parse");
    let exit = run_host(
        &config,
        &world.manager,
        ["trellis", "list"],
        &mut world.stdout,
        &mut world.stderr,
    );
    assert_eq!(exit, ExitCode::FAILURE);
    assert!(world.stderr_text().contains("invalid log filter"));
    assert!(world.stdout_text().is_empty());
}

// -- argument handling -----------------------------------------------------

#[rstest]
fn unknown_subcommand_fails_with_usage_on_stderr(mut world: CliWorld) {
    let exit = world.run(&["trellis", "explode"]);
    assert_eq!(exit, ExitCode::FAILURE);
    assert!(!world.stderr_text().is_empty());
    assert!(world.stdout_text().is_empty());
}

#[rstest]
fn help_is_reported_on_stdout_as_success(mut world: CliWorld) {
    let exit = world.run(&["trellis", "--help"]);
    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(world.stdout_text().contains("install-media"));
}
