//! texrun: rerun only the embedded code that changed

use anyhow::Result;

fn main() -> Result<()> {
    texrun::cli::run()
}
