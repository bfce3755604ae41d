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
use foundry_core::{Archetype, ArchetypeId, NewArchetype};

use crate::Session;

/// Archetype management commands.
#[derive(Debug, Subcommand)]
pub enum ArchetypeCommand {
    /// Register a new archetype.
    Add(AddArgs),
    /// List registered archetypes.
    List,
    /// Change an archetype and propagate it to its projects.
    Edit(EditArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Display name, also used as the platform initialization profile.
    pub name: String,
    /// Upstream repository projects are seeded and updated from.
    #[arg(long)]
    pub source: String,
    /// Branch created in each project to stage updates.
    #[arg(long)]
    pub update_branch: String,
    /// Source operation that pulls upstream changes.
    #[arg(long)]
    pub update_operation: String,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: u64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub update_branch: Option<String>,
    #[arg(long)]
    pub update_operation: Option<String>,
}

impl EditArgs {
    fn apply(self, archetype: &mut Archetype) {
        if let Some(name) = self.name {
            archetype.name = name;
        }
        if let Some(source) = self.source {
            archetype.source_repository_uri = source;
        }
        if let Some(branch) = self.update_branch {
            archetype.update_branch = branch;
        }
        if let Some(operation) = self.update_operation {
            archetype.update_operation = operation;
        }
    }
}

fn print_archetype(archetype: &Archetype) {
    println!(
        "{:>4}  {:<20} {}  (branch {}, operation {})",
        archetype.id.0,
        archetype.name,
        archetype.source_repository_uri,
        archetype.update_branch,
        archetype.update_operation
    );
}

pub async fn run(session: &mut Session, command: ArchetypeCommand) -> Result<()> {
    let service = session.runtime.service.clone();
    match command {
        ArchetypeCommand::Add(args) => {
            let archetype = service
                .add_archetype(NewArchetype {
                    name: args.name,
                    source_repository_uri: args.source,
                    update_branch: args.update_branch,
                    update_operation: args.update_operation,
                })
                .await?;
            session.emit(&archetype, print_archetype)?;
        }
        ArchetypeCommand::List => {
            let archetypes = service.archetypes().await?;
            session.emit(&archetypes, |archetypes| {
                archetypes.iter().for_each(print_archetype)
            })?;
        }
        ArchetypeCommand::Edit(args) => {
            let mut archetype = service.archetype(ArchetypeId(args.id)).await?;
            args.apply(&mut archetype);
            let affected = service.update_archetype(archetype.clone()).await?;
            session.emit(&archetype, print_archetype)?;
            if !session.json() {
                println!("propagating to {affected} project(s)");
            }
            session.drain().await;
        }
    }
    Ok(())
}
