use anyhow::Result;

fn main() -> Result<()> {
    devsweep_cli::run_cli()
}
