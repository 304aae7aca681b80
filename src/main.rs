use anyhow::Result;

mod app;
mod logging;

fn main() -> Result<()> {
    let args = eyepair::cli::parse();
    app::run(args)
}
