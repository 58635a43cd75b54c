use anyhow::{Result, bail};
use reconcile::{Tag, TagSet};

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, tags: &[String]) -> Result<()> {
    let set = parse_tags(tags)?;
    let digest = set.digest();
    if ctx.verbose > 0 {
        ui::header("Tags");
        for tag in set.iter() {
            let value = if tag.propagate {
                format!("{} (propagate)", tag.value)
            } else {
                tag.value.clone()
            };
            ui::kv(&tag.key, &value);
        }
        println!();
    }
    println!("{}", digest.to_hex());
    Ok(())
}

/// Parse `key=value` arguments; a trailing `!` marks the tag as propagating
fn parse_tags(args: &[String]) -> Result<TagSet> {
    let mut set = TagSet::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Invalid tag '{arg}': expected key=value");
        };
        if key.is_empty() {
            bail!("Invalid tag '{arg}': key is empty");
        }
        let tag = match value.strip_suffix('!') {
            Some(value) => Tag::new(key, value).propagating(true),
            None => Tag::new(key, value),
        };
        if set.insert(tag).is_some() {
            bail!("Duplicate tag key '{key}'");
        }
    }
    Ok(set)
}
