//! Console output for test runs

use colored::Colorize;

use super::engine::{ExecutionResult, RunReport};
use super::plan::TestPlan;

/// Print the plan header
pub fn print_header(plan: &TestPlan) {
    println!(
        "\n{} {}",
        "Running Test Plan:".blue().bold(),
        plan.name.as_deref().unwrap_or("(unnamed)").white().bold()
    );
    if let Some(desc) = &plan.description {
        println!("  {}", desc.dimmed());
    }
    println!("\n{}", "Steps:".cyan());
}

/// Print one finished step
pub fn print_step(result: &ExecutionResult, verbose: bool) {
    let step_num = result.index + 1;
    let label = match &result.description {
        Some(desc) => format!("{} ({})", result.script, desc),
        None => result.script.clone(),
    };

    if result.passed() {
        let checked = if result.verification_ran { ", verified" } else { "" };
        println!(
            "  {} Step {}: {}{} {}",
            "✓".green(),
            step_num,
            label,
            checked.dimmed(),
            format!("[{} ms]", result.duration_ms).dimmed()
        );
    } else {
        println!("  {} Step {}: {}", "✗".red(), step_num, label);
        if let Some(failure) = &result.failure {
            println!("      {:?}: {}", failure.kind, failure.message.red());
        }
    }

    if verbose || (!result.passed() && result.verification_passed == Some(false)) {
        if let Some(output) = &result.raw_output {
            println!("      {}", "Device output:".dimmed());
            for line in output.lines() {
                println!("        {}", line.dimmed());
            }
        }
    }
}

/// Print the final summary line
pub fn print_summary(report: &RunReport) {
    let counts = format!(
        "{} passed, {} failed, {} not run",
        report.passed_count(),
        report.failed_count(),
        report.not_run_count()
    );

    if report.passed() {
        println!("\n{} {} ({})\n", "✓".green().bold(), "Test Plan Passed".green().bold(), counts);
        return;
    }

    println!("\n{} {} ({})", "✗".red().bold(), "Test Plan Failed".red().bold(), counts);
    if let Some(index) = report.aborted_at {
        println!(
            "  Aborted after step {}. Changes made by earlier steps were not rolled back.",
            index + 1
        );
    }
    if report.cancelled {
        println!("  Cancelled before step {}.", report.results.len() + 1);
    }
    println!();
}
