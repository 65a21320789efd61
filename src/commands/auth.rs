//! Account commands: login, registration, profile and disclaimer

use super::require_login;
use crate::api::auth::{LoginOutcome, RegisterRequest};
use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::models::UserProfile;
use std::io::{self, BufRead, Write};
use tracing::info;

/// Terms of use shown until the user accepts them
pub const DISCLAIMER: &str = "\
This assistant is under development and intended for internal use within the
organization only.

- Answers generated by the AI may contain errors or inaccuracies
- Analyses and summaries are not professional advice
- Verify critical information independently
- The tool does not replace human judgement in important decisions

Treat all information processed through this tool as confidential. You are
responsible for following the organization's security and privacy policies:
use the application for authorized work only, never share your credentials,
and report any malfunction or security issue.";

/// Ask for a value on stdin
pub fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(Error::Validation(format!("No value entered for {}", label)));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub async fn cmd_login(api: &ApiClient, email: &str, password: &str) -> Result<LoginOutcome> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::Validation(
            "Email and password are required".to_string(),
        ));
    }
    info!("Logging in to {}", api.base_url());
    api.login(email, password).await
}

pub async fn cmd_register(api: &ApiClient, request: RegisterRequest) -> Result<Option<String>> {
    let missing = [
        ("email", &request.email),
        ("password", &request.password),
        ("name", &request.name),
        ("last name", &request.last_name),
        ("division", &request.division),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());
    if let Some((field, _)) = missing {
        return Err(Error::Validation(format!("The {} is required", field)));
    }
    api.register(request).await
}

pub fn cmd_logout(api: &ApiClient) -> Option<String> {
    let name = api.tokens().username();
    api.logout();
    name
}

/// Profile of the logged in user
pub async fn cmd_whoami(api: &ApiClient) -> Result<UserProfile> {
    require_login(api)?;
    api.fetch_me().await
}

/// Accept (or withdraw acceptance of) the disclaimer
pub async fn cmd_disclaimer(api: &ApiClient, accept: bool) -> Result<bool> {
    require_login(api)?;
    let checked = api.set_disclaimer(accept).await?;
    info!("Disclaimer acceptance recorded: {}", checked);
    Ok(checked)
}

pub fn print_login(outcome: &LoginOutcome) {
    println!("\n🔑 Logged in as {}\n", outcome.name);
}

pub fn print_register(message: Option<&str>) {
    println!("\n📝 Registration sent\n");
    println!(
        "{}",
        message.unwrap_or("Your account must be activated by an administrator before you can log in.")
    );
}

pub fn print_whoami(profile: &UserProfile) {
    println!("\n👤 {}\n", full_name(profile));
    println!("Email: {}", profile.email);
    if let Some(division) = profile.division.as_deref().filter(|d| !d.is_empty()) {
        println!("Division: {}", division);
    }
    println!(
        "Role: {}",
        if profile.is_admin() { "administrator" } else { "user" }
    );
    if !profile.disclaimer_checked {
        println!("\n⚠ You have not accepted the terms of use yet.\n");
        print_disclaimer_text();
        println!("\nRun 'ragdesk disclaimer --accept' to accept them.");
    }
}

pub fn print_disclaimer(checked: bool) {
    if checked {
        println!("✓ Terms of use accepted");
    } else {
        println!("Terms of use acceptance withdrawn");
    }
}

pub fn print_disclaimer_text() {
    println!("📄 Terms of use and limitations\n");
    println!("{}", DISCLAIMER);
}

fn full_name(profile: &UserProfile) -> String {
    match profile.last_name.as_deref().filter(|l| !l.is_empty()) {
        Some(last) => format!("{} {}", profile.name, last),
        None => profile.name.clone(),
    }
}
