use anyhow::Result;
use reconcile::{CompositeIdentity, IdentityCodec};

use crate::Context;
use crate::cli::IdCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: IdCommand) -> Result<()> {
    match cmd {
        IdCommand::Encode {
            components,
            separator,
        } => {
            let codec = IdentityCodec::with_separator(separator);
            let identity = codec.encode(components.as_slice())?;
            println!("{identity}");
        }
        IdCommand::Decode {
            id,
            arity,
            separator,
        } => {
            let codec = IdentityCodec::with_separator(separator);
            let components = codec.decode(&CompositeIdentity::from_raw(id), arity)?;
            if ctx.verbose > 0 {
                ui::header("Components");
                for (i, component) in components.iter().enumerate() {
                    ui::kv(&i.to_string(), component);
                }
            } else {
                for component in components {
                    println!("{component}");
                }
            }
        }
    }
    Ok(())
}
