use crate::cli::{FormulaArgs, FormulaCommands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use dosecal::core::expression;
use dosecal::core::units::BeamType;
use dosecal::storage::{FormulaRecord, NewFormula, Store};
use std::collections::BTreeMap;
use tracing::info;

pub fn run(args: FormulaArgs, config: &AppConfig) -> Result<()> {
    match args.command {
        FormulaCommands::Check {
            expression,
            variables,
        } => handle_check(&expression, &variables),
        FormulaCommands::List { beam_type } => {
            let store = Store::open(&config.database)?;
            let beam_type = beam_type.as_deref().map(parse_beam_type).transpose()?;
            handle_list(&store, beam_type)
        }
        FormulaCommands::Create {
            name,
            beam_type,
            expression,
            variables,
            units,
            notes,
            user,
        } => {
            let store = Store::open(&config.database)?;
            let formula = NewFormula {
                name,
                beam_type: parse_beam_type(&beam_type)?,
                expression,
                variables,
                units: parse_units(&units)?,
                notes,
                created_by: config.user_or_default(user),
            };
            handle_create(&store, &formula)
        }
        FormulaCommands::Activate { id } => {
            let store = Store::open(&config.database)?;
            let record = store.formulas().activate(id)?;
            println!(
                "✓ {} v{} (id {}) is now the active {} formula.",
                record.name, record.version, record.id, record.beam_type
            );
            Ok(())
        }
    }
}

fn parse_beam_type(value: &str) -> Result<BeamType> {
    value
        .parse()
        .map_err(|e| CliError::Argument(format!("{}", e)))
}

fn parse_units(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut units = BTreeMap::new();
    for pair in pairs {
        let parts: Vec<&str> = pair.splitn(2, '=').collect();
        if parts.len() != 2 || parts[0].trim().is_empty() {
            return Err(CliError::Argument(format!(
                "Invalid --unit format: '{}'. Expected KEY=VALUE.",
                pair
            )));
        }
        units.insert(parts[0].trim().to_string(), parts[1].trim().to_string());
    }
    Ok(units)
}

fn handle_check(expression: &str, variables: &[String]) -> Result<()> {
    let issues = expression::validate(expression, variables);
    if issues.is_empty() {
        println!("✓ Expression is valid.");
        return Ok(());
    }
    println!("✗ Expression was rejected:");
    for issue in &issues {
        println!("    - {}", issue);
    }
    Err(CliError::Argument(format!(
        "Expression failed validation with {} issue(s).",
        issues.len()
    )))
}

fn format_record(record: &FormulaRecord) -> String {
    let mut line = format!(
        "{:>5}  {:<10} {:<24} v{:<4} {:<9} {}  {}",
        record.id,
        record.beam_type.as_str(),
        record.name,
        record.version,
        record.status.as_str(),
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.expression
    );
    if !record.validation_errors.is_empty() {
        line.push_str(&format!("\n       errors: {}", record.validation_errors.join("; ")));
    }
    line
}

fn handle_list(store: &Store, beam_type: Option<BeamType>) -> Result<()> {
    let records = store.formulas().list(beam_type)?;
    if records.is_empty() {
        println!("No formulas stored. Run 'dosecal init' to install the defaults.");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn handle_create(store: &Store, formula: &NewFormula) -> Result<()> {
    info!("Registering formula '{}' for {} beams", formula.name, formula.beam_type);
    let registration = store.formulas().create(formula)?;
    if !registration.is_valid() {
        println!(
            "✗ {} v{} (id {}) was stored as invalid:",
            formula.name, registration.version, registration.id
        );
        for error in &registration.errors {
            println!("    - {}", error);
        }
        return Err(CliError::Data(format!(
            "Formula '{}' failed validation and cannot be activated.",
            formula.name
        )));
    }
    println!(
        "✓ Created {} v{} (id {}). Activate it with 'dosecal formula activate {}'.",
        formula.name, registration.version, registration.id, registration.id
    );
    Ok(())
}
