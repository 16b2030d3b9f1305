use super::Parser;

#[derive(Parser, Debug)]
#[command(about = "Keeps a learner session alive across foreground/background transitions")]
pub struct Cli {
    /// Path to a settings file (defaults to settings/dev.toml or settings/release.toml).
    #[arg(long)]
    pub settings: Option<String>,
}
