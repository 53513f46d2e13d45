use std::time::Duration;

use comet_core::config::AlignmentConfig;
use comet_core::scheduler::RunSummary;
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    good: Style,
    bad: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            good: Style::new().green().bold(),
            bad: Style::new().red().bold(),
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub fn print_run_summary(config: &AlignmentConfig, workers: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Comet Alignment"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(15)));
    println!();

    let enabled = config.targets.iter().filter(|t| t.enabled).count();
    let reference = &config.targets[config.reference];
    println!(
        "  {:<14}{}",
        s.label.apply_to("Targets"),
        s.value.apply_to(format!(
            "{enabled} of {} enabled",
            config.targets.len()
        ))
    );
    println!(
        "  {:<14}{} {}",
        s.label.apply_to("Reference"),
        s.path.apply_to(reference.path.display()),
        s.label.apply_to(format!("({:.2}, {:.2})", reference.x, reference.y))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Workers"),
        s.value.apply_to(workers)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Interpolation"),
        s.method.apply_to(config.interpolation.method)
    );
    println!();

    // Operand
    if let Some(ref op) = config.operand {
        println!("  {}", s.header.apply_to("Operand"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("File"),
            s.path.apply_to(op.path.display())
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Mode"),
            s.method.apply_to(if op.subtract_mode {
                "align operand, subtract"
            } else {
                "subtract, align target"
            })
        );
        if op.linear_fit.enabled {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Linear fit"),
                s.value.apply_to(format!(
                    "reject ({}, {})",
                    op.linear_fit.reject_low, op.linear_fit.reject_high
                ))
            );
        } else {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Linear fit"),
                s.disabled.apply_to("disabled")
            );
        }
        println!(
            "    {:<12}{}",
            s.label.apply_to("Normalize"),
            s.value.apply_to(on_off(op.normalize))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Drizzle DI"),
            s.value.apply_to(on_off(op.drizzle_integration))
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Operand"),
            s.disabled.apply_to("none, align only")
        );
    }
    println!();

    // Output
    let out = &config.output;
    println!("  {}", s.header.apply_to("Output"));
    if out.directory.as_os_str().is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Directory"),
            s.disabled.apply_to("next to each source")
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Directory"),
            s.path.apply_to(out.directory.display())
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Name"),
        s.value.apply_to(format!("{}<name>{}{}", out.prefix, out.postfix, out.extension))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Overwrite"),
        s.value.apply_to(on_off(out.overwrite))
    );
    if config.drizzle.save_star_aligned || config.drizzle.save_comet_aligned {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Drizzle"),
            s.value.apply_to(format!(
                "star aligned: {}, comet aligned: {}",
                on_off(config.drizzle.save_star_aligned),
                on_off(config.drizzle.save_comet_aligned)
            ))
        );
    }
    println!();
}

pub fn print_run_result(summary: &RunSummary, elapsed: Duration) {
    let s = Styles::new();

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Succeeded"),
        s.good.apply_to(summary.succeeded)
    );
    if summary.skipped > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Skipped"),
            s.disabled.apply_to(summary.skipped)
        );
    }
    if summary.failed > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Failed"),
            s.bad.apply_to(summary.failed)
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Canceled"),
        s.value.apply_to(summary.canceled())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Elapsed"),
        s.value.apply_to(format!("{:.1}s", elapsed.as_secs_f64()))
    );
    println!();
}
