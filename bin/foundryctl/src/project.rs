//! ---
//! fdy_section: "05-networking-external-interfaces"
//! fdy_subsection: "binary"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Control CLI for administrators managing archetypes and projects."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Args, Subcommand};
use foundry_core::{ArchetypeId, NewProject, Project, ProjectId, Runtime};
use serde::Serialize;

use crate::Session;

/// Project management commands.
#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Provision a remote project from an archetype.
    Create(CreateArgs),
    /// List local projects.
    List,
    /// Show a project together with its remote state.
    Show { id: u64 },
    /// Change a project's title locally and remotely.
    Rename { id: u64, title: String },
    /// Delete a project and its remote subscription.
    Delete {
        id: u64,
        /// Required; deleting a project also deletes its remote data.
        #[arg(long)]
        yes: bool,
    },
    /// Stage upstream changes on the update branch.
    Update(Targets),
    /// Merge a staged update into production.
    Merge(Targets),
    /// Back up the production environment.
    Backup(Targets),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    pub title: String,
    #[arg(long)]
    pub archetype: u64,
    /// Region identifier, see `foundryctl regions`.
    #[arg(long)]
    pub region: String,
}

#[derive(Debug, Args)]
pub struct Targets {
    /// Project ids; all projects when omitted.
    pub ids: Vec<u64>,
}

impl Targets {
    async fn resolve(&self, session: &Session) -> Result<Vec<ProjectId>> {
        if !self.ids.is_empty() {
            return Ok(self.ids.iter().copied().map(ProjectId).collect());
        }
        Ok(session
            .runtime
            .service
            .projects()
            .await?
            .into_iter()
            .map(|project| project.id)
            .collect())
    }
}

fn print_project(project: &Project) {
    println!(
        "{:>4}  {:<24} {:<12} {}  (archetype {})",
        project.id.0, project.title, project.remote_project_id, project.region, project.archetype_id.0
    );
}

/// A project merged with what the platform reports about it.
#[derive(Debug, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub url: Option<String>,
    pub update_environment_url: Option<String>,
    pub plan: Option<String>,
    pub recent_activities: Vec<String>,
}

impl ProjectView {
    pub async fn load(runtime: &Runtime, project: Project) -> Result<Self> {
        let insights = &runtime.insights;
        let archetype = runtime.service.archetype(project.archetype_id).await?;
        let url = insights.project_url(&project).await?;
        let update_environment_url = insights
            .update_environment_url(&project, &archetype)
            .await?;
        let plan = insights.plan_size(&project).await?;
        let recent_activities = insights
            .recent_activities(&project)
            .await?
            .into_iter()
            .map(|activity| {
                format!(
                    "{} {} {} {}",
                    activity.created_at.to_rfc3339(),
                    activity.kind,
                    activity.state,
                    activity.result.unwrap_or_default()
                )
            })
            .collect();
        Ok(Self {
            project,
            url,
            update_environment_url,
            plan,
            recent_activities,
        })
    }

    pub fn print(&self) {
        let dash = || "-".to_owned();
        println!("project   {}", self.project.id);
        println!("title     {}", self.project.title);
        println!("remote    {}", self.project.remote_project_id);
        println!("region    {}", self.project.region);
        println!("plan      {}", self.plan.clone().unwrap_or_else(dash));
        println!("url       {}", self.url.clone().unwrap_or_else(dash));
        println!(
            "update    {}",
            self.update_environment_url.clone().unwrap_or_else(dash)
        );
        for line in &self.recent_activities {
            println!("  {line}");
        }
    }
}

pub async fn run(session: &mut Session, command: ProjectCommand) -> Result<()> {
    let service = session.runtime.service.clone();
    match command {
        ProjectCommand::Create(args) => {
            let project = service
                .create_project(NewProject {
                    title: args.title,
                    archetype_id: ArchetypeId(args.archetype),
                    region: args.region,
                })
                .await?;
            session.emit(&project, print_project)?;
        }
        ProjectCommand::List => {
            let projects = service.projects().await?;
            session.emit(&projects, |projects| projects.iter().for_each(print_project))?;
        }
        ProjectCommand::Show { id } => {
            let project = service.project(ProjectId(id)).await?;
            let view = ProjectView::load(&session.runtime, project).await?;
            session.emit(&view, ProjectView::print)?;
        }
        ProjectCommand::Rename { id, title } => {
            let project = service.rename_project(ProjectId(id), title).await?;
            session.emit(&project, print_project)?;
        }
        ProjectCommand::Delete { id, yes } => {
            if !yes {
                anyhow::bail!(
                    "deleting project {id} also deletes its remote project and data; pass --yes to confirm"
                );
            }
            let project = service.delete_project(ProjectId(id)).await?;
            session.emit(&project, print_project)?;
        }
        ProjectCommand::Update(targets) => {
            let ids = targets.resolve(session).await?;
            queued(session, service.request_update(&ids).await?);
        }
        ProjectCommand::Merge(targets) => {
            let ids = targets.resolve(session).await?;
            queued(session, service.request_merge(&ids).await?);
        }
        ProjectCommand::Backup(targets) => {
            let ids = targets.resolve(session).await?;
            queued(session, service.request_backup(&ids).await?);
        }
    }
    let report = session.drain().await;
    if report.failed + report.panicked > 0 {
        anyhow::bail!("some commands failed; see the log for details");
    }
    Ok(())
}

fn queued(session: &Session, count: usize) {
    if !session.json() {
        println!("queued {count} command(s)");
    }
}
