use nginx_steward::analyzer::BackendStatus;
use nginx_steward::workflow::{backup_path, MutationState, WorkflowOptions};
use nginx_steward::{analyze_remote, MemoryShell, MutationError, MutationWorkflow};

const MAIN: &str = "/etc/nginx/nginx.conf";
const SITE: &str = "/etc/nginx/conf.d/shop.conf";
const BEFORE: &str = "server {\n    server_name shop.test;\n    location / {\n        proxy_pass http://shop_v1;\n    }\n}\n";
const AFTER: &str = "server {\n    server_name shop.test;\n    location / {\n        proxy_pass http://shop_v2;\n    }\n}\n";

fn host() -> MemoryShell {
    MemoryShell::new()
        .with_file(MAIN, "events {}\nhttp {\n    include /etc/nginx/conf.d/*.conf;\n}\n")
        .with_file(SITE, BEFORE)
}

fn target_of(shell: &mut MemoryShell) -> String {
    let mirror = tempfile::tempdir().unwrap();
    let result = analyze_remote(shell, MAIN, mirror.path()).unwrap();
    result.virtual_hosts.get("shop.test").unwrap().proxy_targets[0].clone()
}

#[test]
fn update_is_visible_to_the_next_analysis() {
    let mut shell = host();
    assert_eq!(target_of(&mut shell), "shop_v1");

    let outcome = MutationWorkflow::new(&mut shell, WorkflowOptions::default()).update(SITE, AFTER);
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(
        outcome.trace,
        vec![
            MutationState::Start,
            MutationState::ExistenceChecked,
            MutationState::BackedUp,
            MutationState::Written,
            MutationState::SyntaxChecked,
            MutationState::Reloaded,
            MutationState::Done,
        ]
    );
    assert_eq!(target_of(&mut shell), "shop_v2");
}

#[test]
fn rejected_update_leaves_analysis_unchanged() {
    let mut shell = host();
    let broken = AFTER.replace("shop_v2;", "shop_v2");
    let outcome = MutationWorkflow::new(&mut shell, WorkflowOptions::default()).update(SITE, &broken);

    assert_eq!(outcome.status_code, 400);
    assert_eq!(shell.file(SITE), Some(BEFORE));
    assert_eq!(shell.file(&backup_path(SITE)), Some(BEFORE));
    assert_eq!(target_of(&mut shell), "shop_v1");
}

#[test]
fn failed_reload_rolls_back_valid_update() {
    let mut shell = host().failing_reload();
    let outcome = MutationWorkflow::new(&mut shell, WorkflowOptions::default()).update(SITE, AFTER);

    assert!(!outcome.success);
    assert!(matches!(outcome.error, Some(MutationError::ReloadFailed { restored: true, .. })));
    assert_eq!(shell.file(SITE), Some(BEFORE));
}

#[test]
fn repeated_create_does_not_touch_existing_file() {
    let mut shell = host();
    let path = "/etc/nginx/conf.d/new.conf";

    let first = MutationWorkflow::new(&mut shell, WorkflowOptions::default()).create(path, AFTER);
    assert_eq!(first.status_code, 201);
    let second = MutationWorkflow::new(&mut shell, WorkflowOptions::default()).create(path, BEFORE);
    assert_eq!(second.status_code, 409);
    assert_eq!(shell.file(path), Some(AFTER));
}

#[test]
fn custom_binary_and_main_config_are_used() {
    let mut shell = host();
    let options = WorkflowOptions {
        main_config: MAIN.to_string(),
        nginx_binary: "/usr/sbin/nginx".to_string(),
        ..Default::default()
    };
    MutationWorkflow::new(&mut shell, options).update(SITE, AFTER);

    assert!(shell.history().iter().any(|c| c == "/usr/sbin/nginx -t -c /etc/nginx/nginx.conf"));
    assert!(shell.history().iter().any(|c| c == "/usr/sbin/nginx -s reload"));
}

#[test]
fn backend_status_change_is_visible_to_the_next_analysis() {
    let pool = "/etc/nginx/conf.d/pool.conf";
    let mut shell = host().with_file(pool, "upstream shop_v1 {\n    server 10.0.0.1:8080 weight=2;\n    server 10.0.0.2:8080;\n}\n");

    let outcome = MutationWorkflow::new(&mut shell, WorkflowOptions::default()).set_backend_status(
        pool,
        "10.0.0.1:8080",
        BackendStatus::Down,
    );
    assert!(outcome.success, "{}", outcome.message);

    let mirror = tempfile::tempdir().unwrap();
    let result = analyze_remote(&mut shell, MAIN, mirror.path()).unwrap();
    let backend = result.backend_servers.get("10.0.0.1:8080").unwrap();
    assert_eq!(backend.status, BackendStatus::Down);
    assert_eq!(backend.args, vec!["weight=2".to_string(), "down".to_string()]);
    assert_eq!(result.backend_servers.get("10.0.0.2:8080").unwrap().status, BackendStatus::Up);
}
