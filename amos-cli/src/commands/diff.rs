use anyhow::Result;
use clap::Parser;

use amos_core::diff::{DiffChunk, diff_words};

#[derive(Parser)]
pub struct DiffCli {
    pub old: String,
    pub new: String,
}

impl DiffCli {
    pub fn handle(&self) -> Result<()> {
        let rendered: Vec<String> = diff_words(&self.old, &self.new)
            .into_iter()
            .map(|chunk| match chunk {
                DiffChunk::Same(word) => word,
                DiffChunk::Changed { deleted, inserted } => {
                    let mut out = String::new();
                    if !deleted.is_empty() {
                        out.push_str(&format!("[-{}-]", deleted.join(" ")));
                    }
                    if !inserted.is_empty() {
                        out.push_str(&format!("{{+{}+}}", inserted.join(" ")));
                    }
                    out
                }
            })
            .collect();
        println!("{}", rendered.join(" "));
        Ok(())
    }
}
