//! ---
//! fdy_section: "15-testing-qa-runbook"
//! fdy_subsection: "test"
//! fdy_type: "source"
//! fdy_scope: "test"
//! fdy_description: "Per-command handler behaviour against the simulated platform."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
mod common;

use common::{Fixture, SOURCE_URI, UPDATE_BRANCH, UPDATE_OPERATION};
use foundry_common::CodeInitStrategy;
use foundry_core::{
    ArchetypeId, Command, CommandBus, HandlerSettings, Outcome, ProjectId, RemoteProjectId,
    VAR_UPDATE_BRANCH, VAR_UPDATE_OPERATION, VAR_UPDATE_REMOTE,
};
use foundry_platform::{EnvironmentStatus, PlatformCall, PlatformClient, RemoteEnvironment};

fn staged_branch(status: EnvironmentStatus) -> RemoteEnvironment {
    RemoteEnvironment {
        id: UPDATE_BRANCH.into(),
        name: UPDATE_BRANCH.into(),
        status,
        deployment_target: "local".into(),
        has_code: true,
        operations: vec!["merge".into(), "synchronize".into()],
    }
}

#[tokio::test]
async fn variables_mirror_the_archetype() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    let remote = project.remote_project_id.clone();

    for _ in 0..2 {
        fx.runtime
            .bus
            .dispatch(Command::set_variables(archetype, remote.clone()))
            .await
            .unwrap();
    }
    let report = fx.worker.run_until_idle().await;

    assert_eq!(report.applied, 2);
    let variables = fx.sim.variables(&remote);
    assert_eq!(variables.len(), 3);
    assert_eq!(variables[VAR_UPDATE_REMOTE], SOURCE_URI);
    assert_eq!(variables[VAR_UPDATE_BRANCH], UPDATE_BRANCH);
    assert_eq!(variables[VAR_UPDATE_OPERATION], UPDATE_OPERATION);
}

#[tokio::test]
async fn variables_for_unknown_archetype_are_skipped() {
    let mut fx = Fixture::new();
    let remote = fx.sim.seed_project("Orphan");
    fx.runtime
        .bus
        .dispatch(Command::set_variables(ArchetypeId(99), remote.clone()))
        .await
        .unwrap();

    assert_eq!(fx.worker.run_until_idle().await.skipped, 1);
    assert!(fx.sim.variables(&remote).is_empty());
}

#[tokio::test]
async fn git_mirror_code_init_pushes_production_branch() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    let remote = fx
        .sim
        .get_project(&project.remote_project_id)
        .await
        .unwrap()
        .unwrap();

    fx.runtime
        .bus
        .dispatch(Command::initialize_code(archetype, remote.id.clone()))
        .await
        .unwrap();
    assert_eq!(fx.worker.run_until_idle().await.applied, 1);

    let target = format!("{}-shop-template", archetype.0);
    let remote_name = remote.id.to_string();
    assert_eq!(
        fx.git.args(),
        vec![
            vec!["clone".to_owned(), SOURCE_URI.to_owned(), target],
            vec![
                "remote".to_owned(),
                "add".to_owned(),
                remote_name.clone(),
                remote.git_url.clone(),
            ],
            vec!["push".to_owned(), remote_name, "master".to_owned()],
        ]
    );
    assert!(fx.calls().is_empty());
}

#[tokio::test]
async fn each_project_gets_its_own_mirror_remote() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let first = fx.project(archetype).await.remote_project_id;
    let second = fx.project(archetype).await.remote_project_id;
    for remote in [&first, &second] {
        fx.runtime
            .bus
            .dispatch(Command::initialize_code(archetype, remote.clone()))
            .await
            .unwrap();
    }
    assert_eq!(fx.worker.run_until_idle().await.applied, 2);

    let mut added: Vec<String> = fx
        .git
        .args()
        .into_iter()
        .filter(|args| args.starts_with(&["remote".to_owned(), "add".to_owned()]))
        .map(|args| args[2].clone())
        .collect();
    added.sort();
    let mut expected = vec![first.to_string(), second.to_string()];
    expected.sort();
    assert_eq!(added, expected);
}

#[tokio::test]
async fn platform_code_init_initializes_production() {
    let mut fx = Fixture::with_settings(HandlerSettings {
        code_init: CodeInitStrategy::Platform,
        ..HandlerSettings::default()
    });
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    let remote = project.remote_project_id.clone();
    let mut production = fx.sim.environment(&remote, "master").unwrap();
    production.has_code = false;
    fx.sim.set_environment(&remote, production);

    fx.runtime
        .bus
        .dispatch(Command::initialize_code(archetype, remote.clone()))
        .await
        .unwrap();
    assert_eq!(fx.worker.run_until_idle().await.applied, 1);

    assert_eq!(
        fx.calls(),
        vec![PlatformCall::Initialize {
            project: remote.clone(),
            branch: "master".into(),
            profile: "shop".into(),
            repository: SOURCE_URI.into(),
        }]
    );
    assert!(fx.sim.environment(&remote, "master").unwrap().has_code);
    assert!(fx.git.args().is_empty());
}

#[tokio::test]
async fn synchronize_pushes_local_title() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;

    fx.runtime
        .service
        .rename_project(project.id, "Renamed shop")
        .await
        .unwrap();
    assert_eq!(fx.worker.run_until_idle().await.applied, 1);

    assert_eq!(
        fx.calls(),
        vec![PlatformCall::UpdateProject {
            project: project.remote_project_id.clone(),
            title: Some("Renamed shop".into()),
        }]
    );
    let remote = fx
        .sim
        .get_project(&project.remote_project_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote.title, "Renamed shop");
}

#[tokio::test]
async fn merge_backs_up_production_first() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    let remote = project.remote_project_id.clone();
    fx.sim
        .set_environment(&remote, staged_branch(EnvironmentStatus::Active));

    fx.runtime.service.request_merge(&[project.id]).await.unwrap();
    assert_eq!(fx.worker.run_until_idle().await.applied, 1);

    assert_eq!(
        fx.calls(),
        vec![
            PlatformCall::Backup {
                project: remote.clone(),
                branch: "master".into(),
            },
            PlatformCall::Merge {
                project: remote.clone(),
                branch: UPDATE_BRANCH.into(),
            },
        ]
    );
}

#[tokio::test]
async fn merge_without_backup_when_disabled() {
    let mut fx = Fixture::with_settings(HandlerSettings {
        backup_before_merge: false,
        ..HandlerSettings::default()
    });
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    let remote = project.remote_project_id.clone();
    fx.sim
        .set_environment(&remote, staged_branch(EnvironmentStatus::Active));

    fx.runtime.service.request_merge(&[project.id]).await.unwrap();
    assert_eq!(fx.worker.run_until_idle().await.applied, 1);

    assert_eq!(
        fx.calls(),
        vec![PlatformCall::Merge {
            project: remote,
            branch: UPDATE_BRANCH.into(),
        }]
    );
}

#[tokio::test]
async fn merge_is_skipped_unless_branch_is_mergeable() {
    let fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    let remote = project.remote_project_id.clone();
    let command = Command::merge_update(project.id);

    let outcome = fx.runtime.handlers.handle(&command).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));

    fx.sim
        .set_environment(&remote, staged_branch(EnvironmentStatus::Inactive));
    let outcome = fx.runtime.handlers.handle(&command).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));

    let mut busy = staged_branch(EnvironmentStatus::Active);
    busy.operations.clear();
    fx.sim.set_environment(&remote, busy);
    let outcome = fx.runtime.handlers.handle(&command).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));

    assert!(fx.calls().is_empty());
}

#[tokio::test]
async fn backup_targets_production() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;

    fx.runtime.service.request_backup(&[project.id]).await.unwrap();
    assert_eq!(fx.worker.run_until_idle().await.applied, 1);
    assert_eq!(
        fx.calls(),
        vec![PlatformCall::Backup {
            project: project.remote_project_id.clone(),
            branch: "master".into(),
        }]
    );
}

#[tokio::test]
async fn backup_without_production_is_skipped() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    fx.sim.remove_environment(&project.remote_project_id, "master");

    fx.runtime.service.request_backup(&[project.id]).await.unwrap();
    assert_eq!(fx.worker.run_until_idle().await.skipped, 1);
    assert!(fx.calls().is_empty());
}

#[tokio::test]
async fn delete_removes_locally_then_remotely() {
    let mut fx = Fixture::new();
    let archetype = fx.archetype().await;
    let project = fx.project(archetype).await;
    let remote = project.remote_project_id.clone();

    fx.runtime.service.delete_project(project.id).await.unwrap();
    assert!(fx.runtime.service.project(project.id).await.is_err());
    assert_eq!(fx.worker.run_until_idle().await.applied, 1);

    assert!(!fx.sim.project_ids().contains(&remote));
    assert!(matches!(
        fx.calls().as_slice(),
        [PlatformCall::DeleteSubscription { .. }]
    ));
}

#[tokio::test]
async fn delete_of_absent_remote_project_succeeds() {
    let mut fx = Fixture::new();
    let remote = fx.sim.seed_project("Twice");
    for _ in 0..2 {
        fx.runtime
            .bus
            .dispatch(Command::delete(remote.clone()))
            .await
            .unwrap();
    }
    fx.runtime
        .bus
        .dispatch(Command::delete(RemoteProjectId::new("never-existed")))
        .await
        .unwrap();

    // The two deletions of the same project may run concurrently.
    let report = fx.worker.run_until_idle().await;
    assert_eq!(report.applied, 3);
    assert!(fx.sim.project_ids().is_empty());
}

#[tokio::test]
async fn delete_with_vanished_subscription_succeeds() {
    let mut fx = Fixture::new();
    let remote = fx.sim.seed_project("Orphan");
    let subscription = fx
        .sim
        .get_project(&remote)
        .await
        .unwrap()
        .expect("seeded project")
        .subscription_id;
    fx.sim.remove_subscription(&subscription);

    fx.runtime
        .bus
        .dispatch(Command::delete(remote.clone()))
        .await
        .unwrap();
    let report = fx.worker.run_until_idle().await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 0);
    assert!(!fx
        .calls()
        .iter()
        .any(|call| matches!(call, PlatformCall::DeleteSubscription { .. })));
}

#[tokio::test]
async fn deleting_an_unknown_project_is_an_error() {
    let fx = Fixture::new();
    assert!(fx.runtime.service.delete_project(ProjectId(5)).await.is_err());
}

#[tokio::test]
async fn archetype_changes_reach_every_project() {
    let mut fx = Fixture::new();
    let archetype_id = fx.archetype().await;
    let first = fx.project(archetype_id).await;
    let second = fx.project(archetype_id).await;

    let mut archetype = fx.runtime.service.archetype(archetype_id).await.unwrap();
    archetype.update_branch = "upstream".into();
    let affected = fx.runtime.service.update_archetype(archetype).await.unwrap();
    assert_eq!(affected, 2);

    let report = fx.worker.run_until_idle().await;
    assert_eq!(report.applied, 4);
    for project in [&first, &second] {
        let variables = fx.sim.variables(&project.remote_project_id);
        assert_eq!(variables[VAR_UPDATE_BRANCH], "upstream");
    }
}
