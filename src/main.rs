use anyhow::Result;

fn main() -> Result<()> {
    planfs::run()?;
    Ok(())
}
