use std::path::PathBuf;

use clap::CommandFactory;

use crate::Cli;

const BIN_NAME: &str = "permsync";

fn completion_script(shell: clap_complete::Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut out = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut out);
    out
}

fn main_man_page() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut out = Vec::new();
    man.render(&mut out)?;
    Ok(out)
}

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::Write;
    std::io::stdout().write_all(&completion_script(shell))?;
    Ok(())
}

pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            clap_mangen::generate_to(Cli::command(), &dir)?;
            println!("Generated man pages in: {}", dir.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&main_man_page()?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_script_contains_binary_name() {
        let script = completion_script(clap_complete::Shell::Bash);
        let script = String::from_utf8(script).expect("completion output should be UTF-8");
        assert!(script.contains(BIN_NAME));
        assert!(script.contains("repo-perms"));
    }

    #[test]
    fn main_man_page_contains_expected_title() {
        let page = main_man_page().expect("man rendering should succeed");
        let page = String::from_utf8(page).expect("man output should be UTF-8");
        assert!(page.to_lowercase().contains(".th permsync"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
