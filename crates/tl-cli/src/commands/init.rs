//! Init command for establishing machine identity.

use anyhow::Result;

use crate::Config;
use crate::document::LocalDocument;
use crate::machine;

/// Runs the init command.
///
/// Creates `machine.json` if needed and writes an empty document when none
/// exists yet. Running it again only updates the label.
pub fn run(label: Option<&str>, config: &Config) -> Result<()> {
    let identity = machine::init_machine(label)?;

    let fresh = !config.document_path.exists();
    let document = LocalDocument::open_as(config, identity.actor_id()?)?;
    if fresh {
        document.save()?;
    }

    println!("Machine ID: {}", identity.machine_id);
    println!("Label:      {}", identity.label);
    println!("Saved to:   {}", machine::machine_json_path()?.display());
    println!("Document:   {}", config.document_path.display());

    Ok(())
}
