//! Changeset CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::Value;

use super::output::Output;
use crate::domain::{Change, Changeset, ChangesetId, Element, Model};
use crate::staging::{CommitOptions, StagingArea};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum ChangesetCommands {
    /// Create a new changeset from the current model
    Create {
        /// Changeset name (the ID is derived from it)
        name: String,

        /// Longer description
        #[arg(long, short, default_value = "")]
        description: String,

        /// Make the new changeset active
        #[arg(long)]
        activate: bool,
    },

    /// List all changesets
    List,

    /// Show changeset details and its change log
    Show {
        /// Changeset ID (defaults to the active changeset)
        id: Option<String>,
    },

    /// Make a changeset the default target for staging
    Activate {
        /// Changeset ID
        id: String,
    },

    /// Clear the active changeset
    Deactivate,

    /// Stage the addition of a new element
    Add {
        /// Layer name
        layer: String,

        /// Element ID
        element_id: String,

        /// Element type
        #[arg(long = "type", short = 't')]
        element_type: String,

        /// Element name
        #[arg(long, short)]
        name: String,

        /// Property as key=value (value parsed as JSON when possible)
        #[arg(long = "property", short = 'p', value_parser = parse_property)]
        properties: Vec<(String, Value)>,

        /// Reference as target:type
        #[arg(long = "ref", value_parser = parse_link)]
        references: Vec<(String, String)>,

        /// Relationship as target:predicate
        #[arg(long = "rel", value_parser = parse_link)]
        relationships: Vec<(String, String)>,

        /// Target changeset (defaults to the active changeset)
        #[arg(long, short)]
        changeset: Option<String>,
    },

    /// Stage an update of an existing element
    Update {
        /// Layer name
        layer: String,

        /// Element ID
        element_id: String,

        /// New element type
        #[arg(long = "type", short = 't')]
        element_type: Option<String>,

        /// New element name
        #[arg(long, short)]
        name: Option<String>,

        /// Property to set as key=value
        #[arg(long = "property", short = 'p', value_parser = parse_property)]
        properties: Vec<(String, Value)>,

        /// Property to remove
        #[arg(long = "unset")]
        unset: Vec<String>,

        /// Target changeset (defaults to the active changeset)
        #[arg(long, short)]
        changeset: Option<String>,
    },

    /// Stage the removal of an element
    Remove {
        /// Layer name
        layer: String,

        /// Element ID
        element_id: String,

        /// Target changeset (defaults to the active changeset)
        #[arg(long, short)]
        changeset: Option<String>,
    },

    /// Drop every staged change for an element
    Unstage {
        /// Element ID
        element_id: String,

        /// Target changeset (defaults to the active changeset)
        #[arg(long, short)]
        changeset: Option<String>,
    },

    /// Show what committing a changeset would change
    Diff {
        /// Changeset ID (defaults to the active changeset)
        id: Option<String>,
    },

    /// Check whether the model moved since the changeset was created
    Drift {
        /// Changeset ID (defaults to the active changeset)
        id: Option<String>,
    },

    /// Apply a changeset to the model
    Commit {
        /// Changeset ID (defaults to the active changeset)
        id: Option<String>,

        /// Skip model validation
        #[arg(long)]
        no_validate: bool,

        /// Commit despite validation errors or a drifted model
        #[arg(long)]
        force: bool,
    },

    /// Delete a changeset without applying it
    Discard {
        /// Changeset ID
        id: String,
    },
}

pub fn run(cmd: ChangesetCommands, output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let area = project.staging_area();

    match cmd {
        ChangesetCommands::Create {
            name,
            description,
            activate,
        } => create(output, &project, &area, &name, &description, activate),
        ChangesetCommands::List => list(output, &area),
        ChangesetCommands::Show { id } => show(output, &area, id.as_deref()),
        ChangesetCommands::Activate { id } => {
            let id = parse_id(&id)?;
            area.set_active(&id)?;
            output.success(&format!("Active changeset: {}", id));
            Ok(())
        }
        ChangesetCommands::Deactivate => {
            if area.clear_active()? {
                output.success("Cleared active changeset");
            } else {
                output.success("No active changeset");
            }
            Ok(())
        }
        ChangesetCommands::Add {
            layer,
            element_id,
            element_type,
            name,
            properties,
            references,
            relationships,
            changeset,
        } => {
            let mut element = Element::new(element_id, element_type, name);
            element.properties.extend(properties);
            for (target, kind) in references {
                element = element.with_reference(target, kind);
            }
            for (target, predicate) in relationships {
                element = element.with_relationship(target, predicate);
            }

            let id = area.resolve(parse_optional_id(changeset.as_deref())?.as_ref())?;
            stage(output, &area, &id, Change::add(layer, element))
        }
        ChangesetCommands::Update {
            layer,
            element_id,
            element_type,
            name,
            properties,
            unset,
            changeset,
        } => {
            let id = area.resolve(parse_optional_id(changeset.as_deref())?.as_ref())?;
            let before = current_element(&project, &area, &id, &layer, &element_id)?;

            let mut after = before.clone();
            if let Some(element_type) = element_type {
                after.element_type = element_type;
            }
            if let Some(name) = name {
                after.name = name;
            }
            after.properties.extend(properties);
            for key in &unset {
                after.properties.remove(key);
            }

            stage(output, &area, &id, Change::update(layer, before, after))
        }
        ChangesetCommands::Remove {
            layer,
            element_id,
            changeset,
        } => {
            let id = area.resolve(parse_optional_id(changeset.as_deref())?.as_ref())?;
            let before = current_element(&project, &area, &id, &layer, &element_id)?;
            stage(output, &area, &id, Change::delete(layer, before))
        }
        ChangesetCommands::Unstage {
            element_id,
            changeset,
        } => {
            let id = area.resolve(parse_optional_id(changeset.as_deref())?.as_ref())?;
            let removed = area.unstage(&id, &element_id)?;

            if output.is_json() {
                output.data(&serde_json::json!({
                    "changeset": id.as_str(),
                    "element": element_id,
                    "removed": removed,
                }));
            } else if removed == 0 {
                output.success(&format!("No staged changes for '{}' in {}", element_id, id));
            } else {
                output.success(&format!(
                    "Unstaged {} change(s) for '{}' from {}",
                    removed, element_id, id
                ));
            }
            Ok(())
        }
        ChangesetCommands::Diff { id } => diff(output, &project, &area, id.as_deref()),
        ChangesetCommands::Drift { id } => drift(output, &project, &area, id.as_deref()),
        ChangesetCommands::Commit {
            id,
            no_validate,
            force,
        } => {
            let id = area.resolve(parse_optional_id(id.as_deref())?.as_ref())?;
            let options = CommitOptions {
                validate: area.config().validate_on_commit && !no_validate,
                force,
            };
            commit(output, &project, &area, &id, options)
        }
        ChangesetCommands::Discard { id } => {
            let id = parse_id(&id)?;
            if area.delete(&id)? {
                output.success(&format!("Discarded changeset: {}", id));
            } else {
                output.success(&format!("Changeset already gone: {}", id));
            }
            Ok(())
        }
    }
}

fn parse_id(s: &str) -> Result<ChangesetId> {
    s.parse::<ChangesetId>().map_err(Into::into)
}

fn parse_optional_id(s: Option<&str>) -> Result<Option<ChangesetId>> {
    s.map(parse_id).transpose()
}

/// Parses `key=value`, reading the value as JSON when it is valid JSON
fn parse_property(s: &str) -> std::result::Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property key in '{}'", s));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Parses `target:kind`
fn parse_link(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once(':') {
        Some((target, kind)) if !target.is_empty() && !kind.is_empty() => {
            Ok((target.to_string(), kind.to_string()))
        }
        _ => Err(format!("expected target:type, got '{}'", s)),
    }
}

/// The element as it looks with the changeset's earlier changes applied
fn current_element(
    project: &Project,
    area: &StagingArea,
    id: &ChangesetId,
    layer: &str,
    element_id: &str,
) -> Result<Element> {
    let model = project.load_model()?;
    let projected = area.project(&model, id)?;

    projected
        .layer(layer)
        .and_then(|l| l.get(element_id))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Element '{}' not found in layer '{}'", element_id, layer))
}

fn changeset_summary(cs: &Changeset) -> Value {
    serde_json::json!({
        "id": cs.id.as_str(),
        "name": cs.name,
        "description": cs.description,
        "status": cs.status.to_string(),
        "created": cs.created,
        "modified": cs.modified,
        "baseSnapshot": cs.base_snapshot,
        "stats": cs.stats,
    })
}

fn create(
    output: &Output,
    project: &Project,
    area: &StagingArea,
    name: &str,
    description: &str,
    activate: bool,
) -> Result<()> {
    let model = project.load_model()?;
    let cs = area.create(&model, name, description)?;
    if activate {
        area.set_active(&cs.id)?;
    }

    if output.is_json() {
        output.data(&changeset_summary(&cs));
    } else {
        output.success(&format!("Created changeset: {} ({})", cs.id, cs.name));
        if activate {
            output.success(&format!("Active changeset: {}", cs.id));
        }
    }
    Ok(())
}

fn list(output: &Output, area: &StagingArea) -> Result<()> {
    let changesets = area.list()?;
    let active = area.active()?;

    if output.is_json() {
        let items: Vec<_> = changesets
            .iter()
            .map(|cs| {
                let mut item = changeset_summary(cs);
                item["active"] = Value::Bool(active.as_ref() == Some(&cs.id));
                item
            })
            .collect();
        output.data(&items);
    } else if changesets.is_empty() {
        println!("No changesets found.");
    } else {
        println!("  {:<24} {:<10} {:>7} NAME", "ID", "STATUS", "CHANGES");
        println!("{}", "-".repeat(70));
        for cs in &changesets {
            let marker = if active.as_ref() == Some(&cs.id) { "*" } else { " " };
            println!(
                "{} {:<24} {:<10} {:>7} {}",
                marker,
                cs.id,
                cs.status,
                cs.changes.len(),
                cs.name
            );
        }
    }
    Ok(())
}

fn show(output: &Output, area: &StagingArea, id: Option<&str>) -> Result<()> {
    let id = area.resolve(parse_optional_id(id)?.as_ref())?;
    let cs = area.get(&id)?;

    if output.is_json() {
        let mut item = changeset_summary(&cs);
        item["changes"] = serde_json::to_value(cs.ordered_changes())
            .context("Failed to serialize changes")?;
        output.data(&item);
        return Ok(());
    }

    println!("Changeset: {}", cs.id);
    println!("Name: {}", cs.name);
    if !cs.description.is_empty() {
        println!("Description: {}", cs.description);
    }
    println!("Status: {}", cs.status);
    println!("Base: {}", cs.base_snapshot);
    println!("Created: {}", cs.created.format("%Y-%m-%d %H:%M"));
    println!("Modified: {}", cs.modified.format("%Y-%m-%d %H:%M"));
    println!(
        "Stats: +{} ~{} -{}",
        cs.stats.additions, cs.stats.modifications, cs.stats.deletions
    );

    if !cs.is_empty() {
        println!("\nChanges ({}):", cs.changes.len());
        for change in cs.ordered_changes() {
            println!(
                "  #{:<3} {:<6} {}/{}",
                change.sequence_number, change.change_type, change.layer_name, change.element_id
            );
        }
    }
    Ok(())
}

fn stage(output: &Output, area: &StagingArea, id: &ChangesetId, change: Change) -> Result<()> {
    let staged = area.stage(id, change)?;

    if output.is_json() {
        output.data(&staged);
    } else {
        output.success(&format!(
            "Staged #{} {} {}/{} in {}",
            staged.sequence_number, staged.change_type, staged.layer_name, staged.element_id, id
        ));
    }
    Ok(())
}

fn diff(output: &Output, project: &Project, area: &StagingArea, id: Option<&str>) -> Result<()> {
    let id = area.resolve(parse_optional_id(id)?.as_ref())?;
    let model = project.load_model()?;
    let diff = area.diff(&model, &id)?;

    if output.is_json() {
        output.data(&diff);
    } else if diff.is_empty() {
        println!("No differences.");
    } else {
        for delta in &diff.added {
            println!("+ {}/{}", delta.layer, delta.element_id);
        }
        for delta in &diff.modified {
            println!("~ {}/{}", delta.layer, delta.element_id);
        }
        for delta in &diff.removed {
            println!("- {}/{}", delta.layer, delta.element_id);
        }
    }
    Ok(())
}

fn drift(output: &Output, project: &Project, area: &StagingArea, id: Option<&str>) -> Result<()> {
    let id = area.resolve(parse_optional_id(id)?.as_ref())?;
    let model = project.load_model()?;
    let report = area.drift(&model, &id)?;

    if output.is_json() {
        output.data(&report);
    } else if report.has_drift {
        println!("Model has drifted since {} was created.", id);
        println!("  base:    {}", report.expected);
        println!("  current: {}", report.current);
        println!(
            "  potentially affected: {} layer(s), {} element(s)",
            report.affected_layers.len(),
            report.affected_elements.len()
        );
    } else {
        println!("No drift: model matches the base of {}.", id);
    }
    Ok(())
}

fn commit(
    output: &Output,
    project: &Project,
    area: &StagingArea,
    id: &ChangesetId,
    options: CommitOptions,
) -> Result<()> {
    let mut model: Model = project.load_model()?;
    let outcome = area.commit(&mut model, id, options)?;

    if output.is_json() {
        output.data(&outcome);
    } else {
        output.success(&format!(
            "Committed {}: {} change(s) across {} layer(s)",
            outcome.changeset,
            outcome.committed,
            outcome.layers.len()
        ));
    }
    Ok(())
}
