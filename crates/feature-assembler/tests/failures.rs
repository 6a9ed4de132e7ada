use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use feature_assembler::Error;
use feature_assembler::config::{self, BuildDefinition, ConfigDoc};
use feature_assembler::driver::AssemblyDriver;
use feature_assembler::platform::Config;
use feature_assembler::tree::MemTree;
use feature_assembler::workspace::WorkspacePaths;

const BUILD: &str = r#"
[build]
features = ["F", "G"]
label = "I.TestBuild"
configs = "win32,win32,x86 & linux,gtk,x86"

[[site.plugins]]
id = "a"
version = "1.0.0"
location = "plugins/a"

[[site.features]]
id = "G"
version = "1.0.0"
location = "features/G"
plugins = [{ id = "a" }]
"#;

fn driver_for(feature: &str, files: &[&str]) -> (BuildDefinition, AssemblyDriver) {
    let text = format!("{BUILD}\n{feature}");
    let doc = ConfigDoc {
        path: PathBuf::from("<mem>"),
        value: toml::from_str(&text).unwrap(),
    };
    let def = BuildDefinition::from_doc(&doc).unwrap();
    let driver = AssemblyDriver::new(
        def.settings.clone(),
        def.advisor(),
        def.site.clone(),
        WorkspacePaths::at("/work"),
        Arc::new(MemTree::with_files(files.iter().copied())),
        def.configs.clone(),
    );
    (def, driver)
}

#[test]
fn missing_root_file_fails_only_its_units() {
    let feature = r#"
[[site.features]]
id = "F"
version = "1.0.0"
location = "features/F"
plugins = [{ id = "a" }]
[site.features.properties]
"root.linux.gtk.x86" = "gone/launcher"
"#;
    let (def, driver) = driver_for(feature, &["plugins/a/plugin.xml"]);
    let outcomes = driver.generate(&def.features);
    assert_eq!(outcomes.len(), 4);

    // F on win32 has no root files for its config and plans fine.
    assert!(outcomes[0].result.is_ok());
    match &outcomes[1].result {
        Err(Error::MissingElement { feature, path, .. }) => {
            assert_eq!(feature, "F");
            assert_eq!(path, "features/F/gone/launcher");
        }
        other => panic!("expected MissingElement, got {other:?}"),
    }
    assert!(outcomes[2].result.is_ok());
    assert!(outcomes[3].result.is_ok());
}

#[test]
fn odd_link_list_is_malformed() {
    let feature = r#"
[[site.features]]
id = "F"
version = "1.0.0"
location = "features/F"
[site.features.properties]
root = "bin"
"root.link" = "libfoo.so.1,libfoo.so,dangling"
"#;
    let (_, driver) = driver_for(feature, &["features/F/bin/libfoo.so.1"]);
    let err = driver
        .plan_unit("F", &Config::new("linux", "gtk", "x86"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MalformedInstruction { ref key, .. } if key == "root.link"
    ));
}

#[test]
fn unknown_rights_are_malformed() {
    let feature = r#"
[[site.features]]
id = "F"
version = "1.0.0"
location = "features/F"
[site.features.properties]
root = "bin"
"root.permissions.rwx" = "launcher"
"#;
    let (_, driver) = driver_for(feature, &["features/F/bin/launcher"]);
    let err = driver
        .plan_unit("F", &Config::new("linux", "gtk", "x86"))
        .unwrap_err();
    assert!(matches!(err, Error::MalformedInstruction { .. }));
    assert!(err.to_string().contains("rwx"));
}

#[test]
fn missing_plugin_fails_every_config_of_the_feature() {
    let feature = r#"
[[site.features]]
id = "F"
version = "1.0.0"
location = "features/F"
plugins = [{ id = "ghost" }]
"#;
    let (def, driver) = driver_for(feature, &["plugins/a/plugin.xml"]);
    let outcomes = driver.generate_parallel(&def.features, 2);
    let failed: Vec<_> = outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| (o.feature.as_str(), o.config.clone()))
        .collect();
    assert_eq!(
        failed,
        vec![
            ("F", Config::new("win32", "win32", "x86")),
            ("F", Config::new("linux", "gtk", "x86")),
        ]
    );
    assert!(matches!(
        outcomes[0].result,
        Err(Error::MissingElement { ref path, .. }) if path.ends_with("ghost")
    ));
}

#[test]
fn unknown_feature_is_reported() {
    let (_, driver) = driver_for("", &[]);
    assert!(matches!(
        driver.collect("nope"),
        Err(Error::MissingElement { .. })
    ));
}

#[test]
fn loader_merges_extends_imports_and_properties_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.toml"),
        r#"
[build]
label = "I.Base"
format = "tar"
configs = "linux,gtk,x86"
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("site.toml"),
        r#"
[[plugins]]
id = "a"
version = "1.0.0"
location = "plugins/a"

[[features]]
id = "F"
version = "1.0.0"
location = "features/F"
plugins = [{ id = "a" }]
properties_file = "F.properties"

[features.properties]
root = "override"
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("F.properties"),
        "root = rootfiles\nroot.permissions.755 = launcher\n",
    )
    .unwrap();
    let build = dir.path().join("build.toml");
    fs::write(
        &build,
        r#"
extends = "base.toml"

[build]
features = ["F"]
format = "antzip"

[site]
imports = ["site.toml"]
"#,
    )
    .unwrap();

    let doc = config::load(&build).unwrap();
    let def = BuildDefinition::from_doc(&doc).unwrap();
    assert_eq!(def.settings.build_label, "I.Base");
    assert_eq!(def.settings.format.as_str(), "antzip");
    assert_eq!(def.configs, vec![Config::new("linux", "gtk", "x86")]);

    let f = def.site.find_feature("F", None).unwrap();
    assert_eq!(f.properties.get("root"), Some("override"));
    assert_eq!(f.properties.get("root.permissions.755"), Some("launcher"));
}

#[test]
fn properties_files_resolve_through_workspace_aliases() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("defs")).unwrap();
    fs::write(dir.path().join("defs/F.properties"), "root = bin\n").unwrap();
    let build = dir.path().join("build.toml");
    fs::write(
        &build,
        r#"
[build]
features = ["F"]

[workspace.paths]
defs = "defs"

[[site.features]]
id = "F"
version = "1.0.0"
location = "features/F"
properties_file = "@defs/F.properties"
"#,
    )
    .unwrap();

    let def = BuildDefinition::from_doc(&config::load(&build).unwrap()).unwrap();
    let f = def.site.find_feature("F", None).unwrap();
    assert_eq!(f.properties.get("root"), Some("bin"));

    let missing = fs::read_to_string(&build)
        .unwrap()
        .replace("@defs/", "@nowhere/");
    fs::write(&build, missing).unwrap();
    let err = BuildDefinition::from_doc(&config::load(&build).unwrap()).unwrap_err();
    assert!(err.to_string().contains("nowhere"), "{err}");
}

#[test]
fn import_cycles_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.toml"), "extends = \"b.toml\"\n").unwrap();
    fs::write(dir.path().join("b.toml"), "extends = \"a.toml\"\n").unwrap();
    let err = config::load(&dir.path().join("a.toml")).unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn scripts_are_written_as_ant_files() {
    let (_, driver) = driver_for(
        "",
        &["plugins/a/plugin.xml", "features/G/feature.xml"],
    );
    let script = driver
        .plan_unit("G", &Config::new("win32", "win32", "x86"))
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let written = script.write_ant_file(&dir.path().join("out")).unwrap();
    assert_eq!(
        written.file_name().and_then(|n| n.to_str()),
        Some("assemble.G.win32.win32.x86.xml")
    );

    let xml = fs::read_to_string(&written).unwrap();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains(r#"<project name="Assemble G" default="main" basedir="/work">"#));
    assert!(xml.contains(r#"<property name="archiveName" value="G-I.TestBuild-win32.win32.x86.zip"/>"#));
    assert!(xml.contains(r#"<target name="jarIng" if="${source}/${elementName}_exists">"#));
    assert!(xml.trim_end().ends_with("</project>"));
}
