// End-to-end flows over a temporary prefix: extract a bottle into the
// Cellar, link it, observe it through the scanner, then clean up.

use fastbrew::api::{Bottle, RemoteFormula, Versions};
use fastbrew::cellar;
use fastbrew::client::Client;
use fastbrew::pipeline;
use fastbrew::symlink;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn formula(name: &str, version: &str, deps: &[&str]) -> RemoteFormula {
    RemoteFormula {
        name: name.to_string(),
        desc: Some(format!("{name} test formula")),
        homepage: None,
        versions: Versions {
            stable: Some(version.to_string()),
        },
        bottle: Bottle::default(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        keg_only: false,
    }
}

fn make_bottle(dir: &Path, name: &str, version: &str, binaries: &[&str]) -> PathBuf {
    let tar_path = dir.join(format!("{name}-{version}.bottle"));
    let file = fs::File::create(&tar_path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for binary in binaries {
        let content = format!("#!/bin/sh\necho {binary}\n");
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                format!("{name}/{version}/bin/{binary}"),
                content.as_bytes(),
            )
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
    tar_path
}

fn client_for(dir: &TempDir) -> Client {
    Client::with_paths(dir.path().join("prefix"), dir.path().join("cache"))
}

#[tokio::test]
async fn test_install_extract_link_list_cycle() {
    let dir = TempDir::new().unwrap();
    let client = client_for(&dir);
    let cancel = CancellationToken::new();

    let cowsay = formula("cowsay", "3.04", &[]);
    let tar = make_bottle(dir.path(), "cowsay", "3.04", &["cowsay", "cowthink"]);

    pipeline::extract_and_install(&cowsay, &tar, &client.cellar, &client.prefix).unwrap();
    let report = pipeline::link_parallel(&client, &[cowsay], &cancel)
        .await
        .unwrap();
    assert_eq!(report.linked, 1);
    assert!(report.conflicts.is_empty());

    // The keg is complete and the farm points into it.
    let keg_binary = client.cellar.join("cowsay/3.04/bin/cowsay");
    assert!(keg_binary.is_file());
    let link = client.prefix.join("bin/cowsay");
    assert!(link.is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), keg_binary);

    // The native scanner sees it.
    let installed = cellar::list_installed(&client.cellar).unwrap();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].name, "cowsay");
    assert_eq!(installed[0].version, "3.04");
}

#[tokio::test]
async fn test_conflicting_installs_first_writer_wins() {
    let dir = TempDir::new().unwrap();
    let client = client_for(&dir);
    let cancel = CancellationToken::new();

    let alpha = formula("alpha", "1.0", &[]);
    let beta = formula("beta", "1.0", &[]);

    for (f, binaries) in [(&alpha, vec!["foo", "alpha-extra"]), (&beta, vec!["foo"])] {
        let tar = make_bottle(dir.path(), &f.name, "1.0", &binaries);
        pipeline::extract_and_install(f, &tar, &client.cellar, &client.prefix).unwrap();
    }

    let report = pipeline::link_parallel(&client, &[alpha, beta], &cancel)
        .await
        .unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].path, PathBuf::from("bin/foo"));
    assert_eq!(report.conflicts[0].first, "alpha");
    assert_eq!(report.conflicts[0].second, "beta");

    // alpha claimed bin/foo first and keeps it; both packages' other
    // links are intact.
    let target = fs::read_link(client.prefix.join("bin/foo")).unwrap();
    assert!(target.starts_with(client.cellar.join("alpha")));
    assert!(client.prefix.join("bin/alpha-extra").is_symlink());
}

#[tokio::test]
async fn test_upgrade_then_cleanup_drops_old_version() {
    let dir = TempDir::new().unwrap();
    let client = client_for(&dir);
    let cancel = CancellationToken::new();

    // Old version installed and linked.
    let old = formula("foo", "1.0", &[]);
    let tar = make_bottle(dir.path(), "foo", "1.0", &["foo"]);
    pipeline::extract_and_install(&old, &tar, &client.cellar, &client.prefix).unwrap();
    pipeline::link_parallel(&client, &[old], &cancel).await.unwrap();

    // Upgrade to 1.1.
    let new = formula("foo", "1.1", &[]);
    let tar = make_bottle(dir.path(), "foo", "1.1", &["foo"]);
    pipeline::extract_and_install(&new, &tar, &client.cellar, &client.prefix).unwrap();
    pipeline::link_parallel(&client, &[new], &cancel).await.unwrap();

    assert_eq!(
        symlink::linked_version(&client.prefix, "foo").as_deref(),
        Some("1.1")
    );
    let installed = cellar::list_installed(&client.cellar).unwrap();
    assert_eq!(installed[0].version, "1.1");

    // Both versions on disk until cleanup reclaims the old one.
    assert!(client.cellar.join("foo/1.0").exists());
    let report = fastbrew::cleanup::run(&client).unwrap();
    assert_eq!(
        report.removed_versions,
        vec![("foo".to_string(), "1.0".to_string())]
    );
    assert!(!client.cellar.join("foo/1.0").exists());
    assert!(client.cellar.join("foo/1.1").exists());

    // The farm still points at the surviving version.
    let target = fs::read_link(client.prefix.join("bin/foo")).unwrap();
    assert!(target.starts_with(client.cellar.join("foo/1.1")));
}

#[tokio::test]
async fn test_uninstall_flow_removes_keg_and_links() {
    let dir = TempDir::new().unwrap();
    let client = client_for(&dir);
    let cancel = CancellationToken::new();

    let pkg = formula("gone", "1.0", &[]);
    let tar = make_bottle(dir.path(), "gone", "1.0", &["gone"]);
    pipeline::extract_and_install(&pkg, &tar, &client.cellar, &client.prefix).unwrap();
    pipeline::link_parallel(&client, &[pkg], &cancel).await.unwrap();

    symlink::unlink_keg(&client.prefix, &client.cellar, "gone").unwrap();
    fs::remove_dir_all(client.cellar.join("gone")).unwrap();

    assert!(!client.prefix.join("bin/gone").exists());
    assert!(!client.prefix.join("opt/gone").exists());
    assert!(cellar::list_installed(&client.cellar).unwrap().is_empty());
}
