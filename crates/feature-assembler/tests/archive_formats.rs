use std::path::PathBuf;
use std::sync::Arc;

use feature_assembler::config::{BuildDefinition, ConfigDoc, apply_overrides};
use feature_assembler::driver::AssemblyDriver;
use feature_assembler::platform::Config;
use feature_assembler::script::{ArchiveKind, ArchiveMember, AssemblyScript, Step};
use feature_assembler::tree::MemTree;
use feature_assembler::workspace::WorkspacePaths;

const SITE: &str = r#"
[build]
features = ["F"]
label = "I.TestBuild"
configs = "win32,win32,x86 & linux,gtk,x86"
host_os = "linux"

[[site.plugins]]
id = "a"
version = "1.0.0"
location = "plugins/a"

[[site.plugins]]
id = "b"
version = "1.0.0"
location = "plugins/b"

[[site.plugins]]
id = "c"
version = "1.0.0"
location = "plugins/c"

[[site.plugins]]
id = "d"
version = "1.0.0"
location = "plugins/d"

[[site.features]]
id = "F"
version = "1.0.0"
location = "features/F"
plugins = [{ id = "a" }, { id = "b" }, { id = "c" }, { id = "d" }]

[site.features.properties]
root = "bin"
"root.win32.win32.x86.permissions.755" = "launcher"
"root.link" = "libfoo.so.1,libfoo.so"
"#;

fn plan(format: &str, extra: &[&str]) -> Vec<AssemblyScript> {
    let mut doc = ConfigDoc {
        path: PathBuf::from("<mem>"),
        value: toml::from_str(SITE).unwrap(),
    };
    let mut sets = vec![format!("format={format}")];
    sets.extend(extra.iter().map(|s| s.to_string()));
    apply_overrides(&mut doc, &sets).unwrap();
    let def = BuildDefinition::from_doc(&doc).unwrap();
    let tree = MemTree::with_files([
        "plugins/a/plugin.xml",
        "plugins/b/plugin.xml",
        "plugins/c/plugin.xml",
        "plugins/d/plugin.xml",
        "features/F/feature.xml",
        "features/F/bin/launcher",
    ]);
    let driver = AssemblyDriver::new(
        def.settings.clone(),
        def.advisor(),
        def.site.clone(),
        WorkspacePaths::at("/work"),
        Arc::new(tree),
        def.configs.clone(),
    );
    driver
        .generate(&def.features)
        .into_iter()
        .map(|o| o.result.unwrap())
        .collect()
}

fn archive_members(script: &AssemblyScript) -> (ArchiveKind, Vec<ArchiveMember>) {
    script
        .steps
        .iter()
        .find_map(|s| match s {
            Step::Archive { kind, members, .. } => Some((*kind, members.clone())),
            _ => None,
        })
        .expect("archive step")
}

fn execs<'a>(script: &'a AssemblyScript, executable: &str) -> Vec<(&'a str, &'a [String])> {
    script
        .steps
        .iter()
        .filter_map(|s| match s {
            Step::Exec {
                executable: e,
                dir,
                args,
                ..
            } if e == executable => Some((dir.as_str(), args.as_slice())),
            _ => None,
        })
        .collect()
}

const WIN_ROOT: &str = "${eclipse.base}/win32.win32.x86/${collectingFolder}";

#[test]
fn archive_names_carry_config_and_extension() {
    let scripts = plan("zip", &[]);
    assert_eq!(
        scripts[0].property("archiveName"),
        Some("F-I.TestBuild-win32.win32.x86.zip")
    );
    assert_eq!(
        scripts[1].property("archiveName"),
        Some("F-I.TestBuild-linux.gtk.x86.zip")
    );

    let tar = plan("tar", &[]);
    assert_eq!(
        tar[0].property("archiveName"),
        Some("F-I.TestBuild-win32.win32.x86.tar.gz")
    );
}

#[test]
fn antzip_applies_modes_and_excludes_claimed_paths() {
    let scripts = plan("antzip", &[]);
    let (kind, members) = archive_members(&scripts[0]);
    assert_eq!(kind, ArchiveKind::Zip);

    assert!(members.contains(&ArchiveMember::Dir {
        dir: "${eclipse.plugins}/a_1.0.0".into(),
        prefix: "${pluginArchivePrefix}/a_1.0.0".into(),
        includes: None,
        excludes: vec![],
        filemode: None,
    }));
    assert!(members.contains(&ArchiveMember::Dir {
        dir: WIN_ROOT.into(),
        prefix: String::new(),
        includes: Some("launcher".into()),
        excludes: vec![],
        filemode: Some("755".into()),
    }));
    assert_eq!(
        members.last(),
        Some(&ArchiveMember::Dir {
            dir: WIN_ROOT.into(),
            prefix: String::new(),
            includes: None,
            excludes: vec!["launcher".into(), "libfoo.so".into()],
            filemode: None,
        })
    );
    // The link name is excluded from the catch-all but still stored once.
    let linked: Vec<_> = members
        .iter()
        .filter(|m| matches!(m, ArchiveMember::File { .. }))
        .collect();
    assert_eq!(
        linked,
        vec![&ArchiveMember::File {
            file: format!("{WIN_ROOT}/libfoo.so"),
            full_path: "libfoo.so".into(),
            filemode: None,
        }]
    );
}

#[test]
fn config_specific_permissions_do_not_leak_into_other_configs() {
    let scripts = plan("antzip", &[]);
    let (_, members) = archive_members(&scripts[1]);
    assert!(!members.iter().any(|m| matches!(
        m,
        ArchiveMember::Dir {
            filemode: Some(_),
            ..
        }
    )));
    assert!(matches!(
        members.last(),
        Some(ArchiveMember::Dir { excludes, .. }) if excludes == &vec!["libfoo.so".to_string()]
    ));
}

#[test]
fn anttar_carries_links_and_gzip() {
    let scripts = plan("anttar", &["archive_prefix=eclipse"]);
    let (kind, members) = archive_members(&scripts[0]);
    assert_eq!(kind, ArchiveKind::TarGz);
    assert!(members.contains(&ArchiveMember::File {
        file: format!("{WIN_ROOT}/libfoo.so"),
        full_path: "eclipse/libfoo.so".into(),
        filemode: None,
    }));
    assert_eq!(scripts[0].property("pluginArchivePrefix"), Some("eclipse/plugins"));
}

#[test]
fn root_files_get_copied_chmodded_and_linked() {
    let scripts = plan("zip", &[]);
    let steps = &scripts[0].steps;
    assert!(steps.contains(&Step::Mkdir {
        dir: WIN_ROOT.into()
    }));
    assert!(steps.iter().any(|s| matches!(
        s,
        Step::Copy { todir, filesets } if todir == WIN_ROOT
            && filesets[0].dir == "features/F/bin"
            && filesets[0].includes.as_deref() == Some("**")
    )));
    assert!(steps.contains(&Step::Chmod {
        dir: WIN_ROOT.into(),
        perm: "755".into(),
        includes: "launcher".into(),
    }));
    let links = execs(&scripts[0], "ln");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].1, &["-s libfoo.so.1 libfoo.so".to_string()][..]);
    assert!(steps.iter().any(|s| matches!(
        s,
        Step::Exec { executable, os: Some(os), .. } if executable == "ln" && os.contains("Linux")
    )));
}

#[test]
fn links_are_not_created_on_a_win32_host() {
    let scripts = plan("antzip", &["host_os=win32"]);
    assert!(execs(&scripts[0], "ln").is_empty());
    assert!(execs(&scripts[1], "ln").is_empty());
    // No member may point at a link that was never made.
    let (_, members) = archive_members(&scripts[0]);
    assert!(!members.iter().any(|m| matches!(m, ArchiveMember::File { .. })));
}

#[test]
fn zip_entries_are_batched() {
    let scripts = plan("zip", &["zip_batch_size=3"]);
    let zips = execs(&scripts[0], "zip");
    // 4 plugins in two batches, 1 feature, then the root files.
    assert_eq!(zips.len(), 4);
    assert_eq!(zips[0].0, "${assemblyTempDir}");
    assert_eq!(zips[0].1.len(), 4);
    assert_eq!(zips[0].1[1], "${collectingFolder}/plugins/a_1.0.0/");
    assert_eq!(zips[1].1.len(), 2);
    assert_eq!(zips[2].1[1], "${collectingFolder}/features/F_1.0.0/");
    assert_eq!(zips[3].0, "${eclipse.base}/win32.win32.x86");
    assert_eq!(zips[3].1[1], "${collectingFolder}");
}

#[test]
fn tar_gzips_into_the_archive_path() {
    let scripts = plan("tar", &[]);
    let steps = &scripts[0].steps;
    assert_eq!(execs(&scripts[0], "tar").len(), 1);
    assert!(steps.contains(&Step::GZip {
        src: "${assemblyTempDir}/tmp.tar".into(),
        destfile: "${archiveFullPath}".into(),
    }));
}

#[test]
fn folder_format_keeps_the_temp_tree() {
    let scripts = plan("folder", &["host_os=win32"]);
    let steps = &scripts[0].steps;
    assert_eq!(scripts[0].property("archiveName"), Some("F-I.TestBuild-win32.win32.x86"));
    assert!(steps.contains(&Step::Move {
        from_dir: "${eclipse.base}/win32.win32.x86".into(),
        to_dir: "${assemblyTempDir}".into(),
    }));
    let temp_deletes = steps
        .iter()
        .filter(|s| matches!(s, Step::Delete { path } if path == "${assemblyTempDir}"))
        .count();
    // Only the initialization delete.
    assert_eq!(temp_deletes, 1);
}

#[test]
fn folder_format_copies_the_root_folder_elsewhere() {
    let scripts = plan("folder", &[]);
    let steps = &scripts[1].steps;
    let copies = execs(&scripts[1], "cp");
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].0, "${basedir}");
    assert_eq!(
        copies[0].1,
        &["-r ${eclipse.base}/linux.gtk.x86/${collectingFolder} ${assemblyTempDir}".to_string()][..]
    );
    assert!(steps.contains(&Step::Delete {
        path: "${eclipse.base}/linux.gtk.x86".into(),
    }));
    assert!(!steps.iter().any(|s| matches!(s, Step::Move { .. })));
}

#[test]
fn generic_config_omits_suffix() {
    let mut doc = ConfigDoc {
        path: PathBuf::from("<mem>"),
        value: toml::from_str(SITE).unwrap(),
    };
    apply_overrides(&mut doc, &["configs=\"*,*,*\"".into()]).unwrap();
    let def = BuildDefinition::from_doc(&doc).unwrap();
    assert_eq!(def.configs, vec![Config::generic()]);
    let driver = AssemblyDriver::new(
        def.settings.clone(),
        def.advisor(),
        def.site.clone(),
        WorkspacePaths::at("/work"),
        Arc::new(MemTree::with_files(["features/F/bin/launcher"])),
        def.configs.clone(),
    );
    let script = driver.plan_unit("F", &Config::generic()).unwrap();
    assert_eq!(script.property("archiveName"), Some("F-I.TestBuild.zip"));
    assert_eq!(script.file_name, "assemble.F.xml");
}
