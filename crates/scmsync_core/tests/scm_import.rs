use rusqlite::{params, Connection};
use scmsync_core::{
    open_db, open_db_in_memory, EntityKind, ImportError, LicenseRepository, LinkOutcome,
    ScmService, SqliteLicenseRepository, SyncError,
};

const DOMAINS: &str = "\
D: System
M: Alice Smith <alice@i.com>

D: System / Alarm
N: System
I: bob@i.com
";

const TREES: &str = "\
T: system/alarm
D: System / Alarm
L: MIT
A: Alice Smith

T: system/core
D: System
";

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn tree_id(conn: &Connection, gitpath: &str) -> i64 {
    conn.query_row(
        "SELECT id FROM gittrees WHERE gitpath = ?1;",
        params![gitpath],
        |row| row.get(0),
    )
    .unwrap()
}

fn tree_subdomain(conn: &Connection, gitpath: &str) -> (String, String) {
    conn.query_row(
        "SELECT d.name, s.name
         FROM gittrees t
         JOIN subdomains s ON s.id = t.subdomain_id
         JOIN domains d ON d.id = s.domain_id
         WHERE t.gitpath = ?1;",
        params![gitpath],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .unwrap()
}

#[test]
fn first_import_creates_the_whole_hierarchy() {
    let mut conn = open_db_in_memory().unwrap();
    let report = ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();

    assert_eq!(report.stats(EntityKind::Domain).created, 2);
    assert_eq!(report.stats(EntityKind::SubDomain).created, 3);
    assert_eq!(report.stats(EntityKind::GitTree).created, 2);
    assert_eq!(report.stats(EntityKind::User).created, 2);
    assert_eq!(report.stats(EntityKind::DomainRole).created, 1);
    assert_eq!(report.stats(EntityKind::SubDomainRole).created, 1);
    assert_eq!(report.stats(EntityKind::GitTreeRole).created, 1);
    assert_eq!(
        report
            .links(EntityKind::GitTreeRole, EntityKind::User)
            .unwrap()
            .stats
            .added,
        1
    );

    assert_eq!(
        tree_subdomain(&conn, "system/core"),
        ("System".to_string(), "Uncategorized".to_string())
    );
    let (first, last, username): (String, String, String) = conn
        .query_row(
            "SELECT first_name, last_name, username FROM users WHERE email = 'alice@i.com';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(
        (first.as_str(), last.as_str(), username.as_str()),
        ("Alice", "Smith", "alice@i.com")
    );
}

#[test]
fn unknown_license_is_skipped_not_fatal() {
    let mut conn = open_db_in_memory().unwrap();
    let report = ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();

    let licenses = report
        .links(EntityKind::GitTree, EntityKind::License)
        .unwrap();
    assert_eq!(licenses.stats.skipped, 1);
    let skipped: Vec<_> = licenses.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert!(matches!(
        &skipped[0].outcome,
        LinkOutcome::SkippedUnresolved(reason) if reason.contains("license")
    ));
    assert_eq!(count(&conn, "gittree_licenses"), 0);

    SqliteLicenseRepository::new(&conn)
        .register_license("MIT")
        .unwrap();
    let report = ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();
    let licenses = report
        .links(EntityKind::GitTree, EntityKind::License)
        .unwrap();
    assert_eq!(licenses.stats.added, 1);
    assert_eq!(licenses.stats.skipped, 0);
    assert_eq!(count(&conn, "gittree_licenses"), 1);
}

#[test]
fn reimporting_the_same_snapshot_is_a_noop() {
    let mut conn = open_db_in_memory().unwrap();
    ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();
    let alarm_id = tree_id(&conn, "system/alarm");

    let report = ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();
    assert!(report.is_noop(), "{report:?}");
    assert_eq!(tree_id(&conn, "system/alarm"), alarm_id);
}

#[test]
fn renaming_a_subdomain_moves_trees_without_recreating_them() {
    let mut conn = open_db_in_memory().unwrap();
    ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();
    let alarm_id = tree_id(&conn, "system/alarm");

    let domains = DOMAINS.replace("System / Alarm", "System / Alerts");
    let trees = TREES.replace("System / Alarm", "System / Alerts");
    let report = ScmService::new(&mut conn).import(&domains, &trees).unwrap();

    let subdomains = report.stats(EntityKind::SubDomain);
    assert_eq!((subdomains.created, subdomains.deleted), (1, 1));
    let trees_stats = report.stats(EntityKind::GitTree);
    assert_eq!(
        (trees_stats.created, trees_stats.updated, trees_stats.deleted),
        (0, 1, 0)
    );

    assert_eq!(tree_id(&conn, "system/alarm"), alarm_id);
    assert_eq!(
        tree_subdomain(&conn, "system/alarm"),
        ("System".to_string(), "Alerts".to_string())
    );
    // The tree role hangs off the tree, so it survives the rename.
    assert_eq!(count(&conn, "gittree_role_users"), 1);
}

#[test]
fn dropped_tree_is_deleted_with_its_roles() {
    let mut conn = open_db_in_memory().unwrap();
    ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();

    let trees = "T: system/core\nD: System\n";
    let report = ScmService::new(&mut conn).import(DOMAINS, trees).unwrap();

    assert_eq!(report.stats(EntityKind::GitTree).deleted, 1);
    assert_eq!(report.stats(EntityKind::GitTreeRole).deleted, 1);
    assert_eq!(count(&conn, "gittrees"), 1);
    assert_eq!(count(&conn, "gittree_roles"), 0);
    assert_eq!(count(&conn, "gittree_role_users"), 0);
}

#[test]
fn role_members_are_pruned_but_users_are_kept() {
    let mut conn = open_db_in_memory().unwrap();
    let before = "D: System\nI: alice@i.com\nI: bob@i.com\n";
    let after = "D: System\nI: bob@i.com\n";

    ScmService::new(&mut conn).import(before, "").unwrap();
    assert_eq!(count(&conn, "domain_role_users"), 2);

    let report = ScmService::new(&mut conn).import(after, "").unwrap();
    let members = report
        .links(EntityKind::DomainRole, EntityKind::User)
        .unwrap();
    assert_eq!((members.stats.added, members.stats.removed), (0, 1));
    assert_eq!(report.stats(EntityKind::User).deleted, 0);

    let remaining: String = conn
        .query_row(
            "SELECT u.email FROM domain_role_users ru JOIN users u ON u.id = ru.user_id;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, "bob@i.com");
    assert_eq!(count(&conn, "users"), 2);
}

#[test]
fn name_only_references_resolve_to_the_emailed_user() {
    let mut conn = open_db_in_memory().unwrap();
    let domains = "D: System\nM: Alice Smith\n\nD: Apps\nR: Alice Smith <alice@i.com>\n";
    ScmService::new(&mut conn).import(domains, "").unwrap();

    assert_eq!(count(&conn, "users"), 1);
    assert_eq!(count(&conn, "domain_role_users"), 2);
}

#[test]
fn failed_sync_rolls_back_every_write() {
    let mut conn = open_db_in_memory().unwrap();
    ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();

    let domains = format!("{DOMAINS}\nD: Apps\n");
    let trees = format!("{TREES}\nT: ghost/tree\nD: Ghost / Sub\n");
    let err = ScmService::new(&mut conn)
        .import_unchecked(&domains, &trees)
        .unwrap_err();

    assert!(matches!(
        err,
        ImportError::Sync(SyncError::UnresolvedReference {
            entity: EntityKind::GitTree,
            target: EntityKind::Domain,
            ..
        })
    ));
    let apps: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM domains WHERE name = 'Apps';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(apps, 0);
    assert_eq!(count(&conn, "gittrees"), 2);
}

#[test]
fn gated_import_refuses_unknown_tree_domain() {
    let mut conn = open_db_in_memory().unwrap();
    let err = ScmService::new(&mut conn)
        .import(DOMAINS, "T: ghost/tree\nD: Ghost\n")
        .unwrap_err();

    let ImportError::Validation(report) = err else {
        panic!("expected validation failure");
    };
    assert_eq!(report.errors, 1);
    assert!(report.messages[0].contains("unknown domain \"Ghost\""));
    assert_eq!(count(&conn, "domains"), 0);
}

#[test]
fn file_database_keeps_state_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scm.sqlite3");

    {
        let mut conn = open_db(&path).unwrap();
        ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();
    }

    let mut conn = open_db(&path).unwrap();
    let report = ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();
    assert!(report.is_noop());
    assert_eq!(count(&conn, "gittrees"), 2);
}

#[test]
fn report_serializes_for_machine_consumers() {
    let mut conn = open_db_in_memory().unwrap();
    let report = ScmService::new(&mut conn).import(DOMAINS, TREES).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["run_id"], serde_json::json!(report.run_id.to_string()));
    assert_eq!(json["entities"]["git_tree"]["created"], 2);
    assert_eq!(json["entities"]["user"]["deleted"], 0);

    let licenses = json["links"]
        .as_array()
        .unwrap()
        .iter()
        .find(|sync| sync["right"] == "license")
        .unwrap();
    assert_eq!(licenses["stats"]["skipped"], 1);
    assert_eq!(licenses["records"][0]["left"], "system/alarm");
    assert!(licenses["records"][0]["outcome"]["skipped_unresolved"].is_string());
}
