use crossterm::style::Stylize;
use std::io::{self, Write};
use std::process::Command;

/// Availability of one external tool the crawler relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: &'static str,
    pub version: Option<String>,
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn command_version(program: &str, arg: &str) -> Option<String> {
    let output = Command::new(program).arg(arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    first_line(&output.stdout)
}

fn chrome_version() -> Option<String> {
    let executable = headless_chrome::browser::default_executable().ok()?;
    command_version(&executable.to_string_lossy(), "--version")
        .or_else(|| Some(executable.display().to_string()))
}

pub fn collect() -> Vec<Dependency> {
    vec![
        Dependency {
            name: env!("CARGO_PKG_NAME"),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        },
        Dependency {
            name: "chrome",
            version: chrome_version(),
        },
        Dependency {
            name: "pandoc",
            version: command_version("pandoc", "--version"),
        },
        Dependency {
            name: "npx",
            version: command_version("npx", "--version"),
        },
    ]
}

pub fn write_table<W: Write>(out: &mut W, dependencies: &[Dependency]) -> io::Result<()> {
    writeln!(out, "{}", "Dependency Versions".bold())?;
    writeln!(out, "  {:<14} {:<48} Status", "Package", "Version")?;
    for dependency in dependencies {
        let (version, status) = match &dependency.version {
            Some(version) => (version.as_str(), "✓ Installed".green()),
            None => ("not found", "✗ Missing".red()),
        };
        writeln!(
            out,
            "  {} {:<48} {}",
            format!("{:<14}", dependency.name).cyan(),
            version,
            status
        )?;
    }
    out.flush()
}
