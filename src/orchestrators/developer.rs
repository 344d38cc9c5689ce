//! Senior Developer Orchestrator
//!
//! Code quality workflows for Node.js projects: detects the package manager
//! and tooling from `package.json`, then shells out to lint, type check and
//! test. Also reads Excel workbooks and PDF text for quick inspection.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use super::print_json;
use crate::error::ToolError;
use crate::tools::excel::Workbook;
use crate::tools::pdf;

/// Rows printed when previewing a sheet
const PREVIEW_ROWS: usize = 5;

// ============================================================
// CLI
// ============================================================

/// Senior Developer - code quality and development workflows
#[derive(Parser, Debug)]
#[command(name = "senior-dev", version, about)]
pub struct SeniorDevCli {
    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory
    #[arg(long, global = true, default_value = ".", env = "OPSBENCH_PROJECT_DIR")]
    pub dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<DevCommand>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum DevCommand {
    /// Show project detection results
    Detect,
    /// Run linting
    Lint {
        /// Apply auto-fixes
        #[arg(long)]
        fix: bool,
    },
    /// Run TypeScript type checking
    Typecheck,
    /// Run tests
    Test {
        /// Keep running in watch mode
        #[arg(long)]
        watch: bool,
    },
    /// Run lint, typecheck and test
    Check,
    /// Show git status and recent commits
    Git,
    /// Summarize an Excel workbook, optionally previewing one sheet
    Excel { file: PathBuf, sheet: Option<String> },
    /// Extract PDF text, falling back to OCR for scanned documents
    Pdf {
        file: PathBuf,
        /// Report the text layer only, even when it looks scanned
        #[arg(long)]
        no_ocr: bool,
    },
}

// ============================================================
// Project Detection
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }
}

/// What the project directory looks like
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    #[serde(rename = "type")]
    pub project_type: String,
    pub package_manager: Option<PackageManager>,
    #[serde(rename = "hasTypeScript")]
    pub has_typescript: bool,
    pub has_lint: bool,
    pub has_test: bool,
    pub has_prettier: bool,
    pub framework: Option<String>,
}

impl Default for ProjectInfo {
    fn default() -> Self {
        Self {
            project_type: "unknown".to_string(),
            package_manager: None,
            has_typescript: false,
            has_lint: false,
            has_test: false,
            has_prettier: false,
            framework: None,
        }
    }
}

impl ProjectInfo {
    /// Package manager used to run scripts; npm when no lockfile was found
    pub fn runner(&self) -> PackageManager {
        self.package_manager.unwrap_or(PackageManager::Npm)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    scripts: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    dev_dependencies: Option<BTreeMap<String, Value>>,
}

/// Lockfiles in priority order
const LOCKFILES: &[(&str, PackageManager)] = &[
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("yarn.lock", PackageManager::Yarn),
    ("package-lock.json", PackageManager::Npm),
];

/// Frameworks in priority order
const FRAMEWORKS: &[&str] = &["next", "react", "vue", "express"];

/// Inspect `dir` for a Node.js project
pub fn detect_project(dir: &Path) -> Result<ProjectInfo> {
    let pkg_path = dir.join("package.json");
    if !pkg_path.exists() {
        return Ok(ProjectInfo::default());
    }

    let content = std::fs::read_to_string(&pkg_path)
        .with_context(|| format!("Failed to read {}", pkg_path.display()))?;
    let pkg: PackageJson = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", pkg_path.display()))?;

    let scripts = pkg.scripts.unwrap_or_default();
    let mut deps = pkg.dependencies.unwrap_or_default();
    deps.extend(pkg.dev_dependencies.unwrap_or_default());

    let package_manager = LOCKFILES
        .iter()
        .find(|(file, _)| dir.join(file).exists())
        .map(|(_, pm)| *pm);

    Ok(ProjectInfo {
        project_type: "node".to_string(),
        package_manager,
        has_typescript: deps.contains_key("typescript") || dir.join("tsconfig.json").exists(),
        has_lint: scripts.contains_key("lint"),
        has_test: scripts.contains_key("test"),
        has_prettier: scripts.contains_key("format") || scripts.contains_key("prettier"),
        framework: FRAMEWORKS
            .iter()
            .find(|name| deps.contains_key(**name))
            .map(|name| name.to_string()),
    })
}

/// Status block printed when no command is given
pub fn status_block(project: &ProjectInfo) -> String {
    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    format!(
        "Senior Developer Orchestrator\n\n\
         Project: {}\n\
         Package Manager: {}\n\
         Framework: {}\n\
         TypeScript: {}\n\
         Lint: {}\n\
         Tests: {}\n",
        project.project_type,
        project
            .package_manager
            .map(|pm| pm.program())
            .unwrap_or("not detected"),
        project.framework.as_deref().unwrap_or("none"),
        yes_no(project.has_typescript),
        yes_no(project.has_lint),
        yes_no(project.has_test),
    )
}

// ============================================================
// Commands
// ============================================================

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// `<pm> run <script>`, forwarding `extra` after `--`
fn script_command(project: &ProjectInfo, script: &str, extra: Option<&str>) -> CommandSpec {
    let mut args = vec!["run", script];
    if let Some(extra) = extra {
        args.extend(["--", extra]);
    }
    CommandSpec::new(project.runner().program(), &args)
}

pub fn lint_command(project: &ProjectInfo, fix: bool) -> Result<CommandSpec, ToolError> {
    if !project.has_lint {
        return Err(ToolError::InvalidArgument(
            "No lint script found in package.json".into(),
        ));
    }
    Ok(script_command(project, "lint", fix.then_some("--fix")))
}

pub fn typecheck_command(project: &ProjectInfo) -> Result<CommandSpec, ToolError> {
    if !project.has_typescript {
        return Err(ToolError::InvalidArgument("TypeScript not detected".into()));
    }
    Ok(CommandSpec::new("npx", &["tsc", "--noEmit"]))
}

pub fn test_command(project: &ProjectInfo, watch: bool) -> Result<CommandSpec, ToolError> {
    if !project.has_test {
        return Err(ToolError::InvalidArgument(
            "No test script found in package.json".into(),
        ));
    }
    Ok(script_command(project, "test", watch.then_some("--watch")))
}

/// Run with inherited stdio; true on a zero exit status
pub async fn run_command(step: &CommandSpec, cwd: &Path) -> Result<bool> {
    debug!(command = %step, cwd = %cwd.display(), "Running command");
    let status = Command::new(&step.program)
        .args(&step.args)
        .current_dir(cwd)
        .status()
        .await
        .with_context(|| format!("Failed to run {}", step))?;
    Ok(status.success())
}

/// Run one step, failing when the command exits non-zero
async fn run_step(step: CommandSpec, cwd: &Path) -> Result<()> {
    println!("Running: {}", step);
    if run_command(&step, cwd).await? {
        Ok(())
    } else {
        anyhow::bail!("Command failed: {}", step)
    }
}

/// Outcome of one quality check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Failed,
    Unavailable(String),
}

impl CheckOutcome {
    pub fn mark(&self) -> &'static str {
        match self {
            CheckOutcome::Passed => "✓",
            _ => "✗",
        }
    }
}

async fn check_step(step: Result<CommandSpec, ToolError>, cwd: &Path) -> Result<CheckOutcome> {
    match step {
        Ok(step) => {
            println!("Running: {}", step);
            Ok(if run_command(&step, cwd).await? {
                CheckOutcome::Passed
            } else {
                CheckOutcome::Failed
            })
        }
        Err(reason) => {
            println!("{}", reason);
            Ok(CheckOutcome::Unavailable(reason.to_string()))
        }
    }
}

async fn run_checks(project: &ProjectInfo, cwd: &Path) -> Result<()> {
    println!("=== Running all quality checks ===\n");

    println!("--- Lint ---");
    let lint = check_step(lint_command(project, false), cwd).await?;
    println!("\n--- Type Check ---");
    let types = check_step(typecheck_command(project), cwd).await?;
    println!("\n--- Tests ---");
    let tests = check_step(test_command(project, false), cwd).await?;

    println!("\n=== Summary ===");
    println!("Lint: {}", lint.mark());
    println!("TypeScript: {}", types.mark());
    println!("Tests: {}", tests.mark());

    let all_passed = [lint, types, tests]
        .iter()
        .all(|outcome| *outcome == CheckOutcome::Passed);
    if all_passed {
        Ok(())
    } else {
        anyhow::bail!("Quality checks failed")
    }
}

async fn git_status(cwd: &Path) -> Result<()> {
    println!("=== Git Status ===\n");
    run_command(&CommandSpec::new("git", &["status"]), cwd).await?;
    println!("\n=== Recent Commits ===\n");
    run_command(&CommandSpec::new("git", &["log", "-n", "5", "--oneline"]), cwd).await?;
    Ok(())
}

fn read_excel(file: &Path, sheet: Option<&str>) -> Result<()> {
    let mut workbook = Workbook::open(file)?;
    let summary = workbook.summary()?;

    println!("=== Workbook Summary ===");
    println!("File: {}", file.display());
    println!("Sheets: {}", summary.sheet_count);
    for s in &summary.sheets {
        println!("  - {}: {} rows x {} cols", s.name, s.rows, s.cols);
    }
    if let Some(warning) = &summary.warning {
        println!("\n{}", warning);
    }

    if let Some(sheet) = sheet {
        let rows = workbook.sheet_data(sheet)?;
        println!("\n=== Sheet: {} ===", sheet);
        println!("Rows: {}", rows.len());
        if let Some(first) = rows.first() {
            let columns: Vec<&str> = first.keys().map(String::as_str).collect();
            println!("Columns: {}", columns.join(", "));
            println!("\nFirst {} rows:", PREVIEW_ROWS);
            let preview: Vec<_> = rows.iter().take(PREVIEW_ROWS).collect();
            print_json(&preview)?;
        }
    }
    Ok(())
}

/// Dispatch a parsed command line
pub async fn run(cli: SeniorDevCli) -> Result<()> {
    let dir = cli.dir.as_path();

    let Some(command) = cli.command else {
        let project = detect_project(dir)?;
        println!("{}", status_block(&project));
        println!("{}", SeniorDevCli::command().render_help());
        return Ok(());
    };

    info!(command = ?command, dir = %dir.display(), "Running senior-dev command");
    match command {
        DevCommand::Detect => print_json(&detect_project(dir)?),
        DevCommand::Lint { fix } => run_step(lint_command(&detect_project(dir)?, fix)?, dir).await,
        DevCommand::Typecheck => run_step(typecheck_command(&detect_project(dir)?)?, dir).await,
        DevCommand::Test { watch } => {
            run_step(test_command(&detect_project(dir)?, watch)?, dir).await
        }
        DevCommand::Check => run_checks(&detect_project(dir)?, dir).await,
        DevCommand::Git => git_status(dir).await,
        DevCommand::Excel { file, sheet } => read_excel(&file, sheet.as_deref()),
        DevCommand::Pdf { file, no_ocr: true } => print_json(&pdf::read_pdf(&file)?),
        DevCommand::Pdf { file, no_ocr: false } => print_json(&pdf::read_pdf_with_ocr(&file).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_dir(package_json: &str, extra_files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("package.json"), package_json).unwrap();
        for file in extra_files {
            std::fs::write(tmp.path().join(file), "").unwrap();
        }
        tmp
    }

    #[test]
    fn test_detect_without_package_json() {
        let tmp = TempDir::new().unwrap();
        let project = detect_project(tmp.path()).unwrap();
        assert_eq!(project, ProjectInfo::default());
        assert_eq!(project.project_type, "unknown");
    }

    #[test]
    fn test_detect_node_project() {
        let tmp = project_dir(
            r#"{
                "scripts": { "lint": "eslint .", "test": "vitest", "format": "prettier -w ." },
                "dependencies": { "react": "^18", "next": "^14" },
                "devDependencies": { "typescript": "^5" }
            }"#,
            &["yarn.lock", "package-lock.json"],
        );

        let project = detect_project(tmp.path()).unwrap();
        assert_eq!(project.project_type, "node");
        assert_eq!(project.package_manager, Some(PackageManager::Yarn));
        assert!(project.has_typescript);
        assert!(project.has_lint);
        assert!(project.has_test);
        assert!(project.has_prettier);
        assert_eq!(project.framework.as_deref(), Some("next"));
    }

    #[test]
    fn test_detect_typescript_from_tsconfig() {
        let tmp = project_dir(r#"{ "dependencies": { "express": "4" } }"#, &["tsconfig.json"]);

        let project = detect_project(tmp.path()).unwrap();
        assert!(project.has_typescript);
        assert!(!project.has_lint);
        assert_eq!(project.package_manager, None);
        assert_eq!(project.framework.as_deref(), Some("express"));
    }

    #[test]
    fn test_detect_rejects_invalid_package_json() {
        let tmp = project_dir("{ not json", &[]);
        let err = detect_project(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_project_info_json_keys() {
        let value = serde_json::to_value(ProjectInfo {
            package_manager: Some(PackageManager::Pnpm),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(value["type"], "unknown");
        assert_eq!(value["packageManager"], "pnpm");
        assert_eq!(value["hasTypeScript"], false);
        assert!(value["framework"].is_null());
    }

    #[test]
    fn test_lint_and_test_commands() {
        let project = ProjectInfo {
            project_type: "node".into(),
            package_manager: Some(PackageManager::Pnpm),
            has_lint: true,
            has_test: true,
            ..Default::default()
        };

        assert_eq!(lint_command(&project, false).unwrap().to_string(), "pnpm run lint");
        assert_eq!(
            lint_command(&project, true).unwrap().to_string(),
            "pnpm run lint -- --fix"
        );
        assert_eq!(
            test_command(&project, true).unwrap().to_string(),
            "pnpm run test -- --watch"
        );
    }

    #[test]
    fn test_commands_default_to_npm_and_require_scripts() {
        let project = ProjectInfo {
            has_test: true,
            ..Default::default()
        };

        assert_eq!(test_command(&project, false).unwrap().to_string(), "npm run test");
        assert!(lint_command(&project, false).is_err());
        assert!(typecheck_command(&project).is_err());
    }

    #[test]
    fn test_typecheck_command() {
        let project = ProjectInfo {
            has_typescript: true,
            ..Default::default()
        };
        assert_eq!(
            typecheck_command(&project).unwrap(),
            CommandSpec::new("npx", &["tsc", "--noEmit"])
        );
    }

    #[test]
    fn test_status_block() {
        let block = status_block(&ProjectInfo::default());
        assert!(block.contains("Project: unknown"));
        assert!(block.contains("Package Manager: not detected"));
        assert!(block.contains("Framework: none"));
        assert!(block.contains("TypeScript: no"));
    }

    #[test]
    fn test_check_outcome_marks() {
        assert_eq!(CheckOutcome::Passed.mark(), "✓");
        assert_eq!(CheckOutcome::Failed.mark(), "✗");
        assert_eq!(CheckOutcome::Unavailable("none".into()).mark(), "✗");
    }

    #[test]
    fn test_cli_parsing() {
        let cli = SeniorDevCli::try_parse_from(["senior-dev", "lint", "--fix"]).unwrap();
        assert_eq!(cli.command, Some(DevCommand::Lint { fix: true }));

        let cli = SeniorDevCli::try_parse_from(["senior-dev", "excel", "book.xlsx", "Data"]).unwrap();
        assert_eq!(
            cli.command,
            Some(DevCommand::Excel {
                file: PathBuf::from("book.xlsx"),
                sheet: Some("Data".into())
            })
        );

        let cli = SeniorDevCli::try_parse_from(["senior-dev", "pdf", "scan.pdf", "--no-ocr"]).unwrap();
        assert_eq!(
            cli.command,
            Some(DevCommand::Pdf {
                file: PathBuf::from("scan.pdf"),
                no_ocr: true
            })
        );

        let cli = SeniorDevCli::try_parse_from(["senior-dev"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_and_incomplete_commands() {
        assert!(SeniorDevCli::try_parse_from(["senior-dev", "deploy"]).is_err());
        assert!(SeniorDevCli::try_parse_from(["senior-dev", "pdf"]).is_err());
    }

    #[tokio::test]
    async fn test_run_command_missing_program() {
        let tmp = TempDir::new().unwrap();
        let step = CommandSpec::new("opsbench-no-such-program", &[]);
        let err = run_command(&step, tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to run opsbench-no-such-program"));
    }

    #[tokio::test]
    async fn test_detect_command_prints_json() {
        let tmp = TempDir::new().unwrap();
        let cli = SeniorDevCli {
            verbose: false,
            dir: tmp.path().to_path_buf(),
            command: Some(DevCommand::Detect),
        };
        run(cli).await.unwrap();
    }
}
