use std::{fs, path::PathBuf};

use ts_rs::TS;

fn generate_types_content() -> String {
    // Order matters little to TypeScript but keeps diffs stable.
    let decls = [
        utils::response::ApiResponse::<(), ()>::decl(),
        utils::validation::FieldErrors::decl(),
        db::models::agency::CompanySize::decl(),
        db::models::agency::AgencySort::decl(),
        db::models::agency::Agency::decl(),
        db::models::agency::AgencyWithRelations::decl(),
        db::models::trade::Trade::decl(),
        db::models::region::Region::decl(),
        db::models::profile::UserRole::decl(),
        db::models::profile::Profile::decl(),
        db::models::profile::UpdateProfile::decl(),
        db::models::claim_request::ClaimStatus::decl(),
        db::models::claim_request::VerificationMethod::decl(),
        db::models::claim_request::ClaimRequest::decl(),
        db::models::claim_request::ClaimRequestWithAgency::decl(),
        db::models::feature_flag::FeatureFlag::decl(),
        services::services::agencies::AgencySearchParams::decl(),
        services::services::agencies::AgencySearchResponse::decl(),
        services::services::agencies::CreateAgency::decl(),
        services::services::agencies::UpdateAgency::decl(),
        services::services::claims::SubmitClaim::decl(),
        services::services::claims::RejectClaim::decl(),
        services::services::claims::ClaimListParams::decl(),
        services::services::claims::ClaimListResponse::decl(),
        services::services::users::UserListParams::decl(),
        services::services::users::UserListResponse::decl(),
        services::services::bulk_import::RowError::decl(),
        services::services::bulk_import::SkippedRow::decl(),
        services::services::bulk_import::ImportSummary::decl(),
        services::services::audit::AuditLogParams::decl(),
        services::services::audit::AuditLogView::decl(),
        services::services::audit::AuditLogPage::decl(),
        services::services::feature_flags::SetFeatureFlag::decl(),
        server::routes::health::HealthStatus::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|decl| {
            let trimmed = decl.trim_start();
            if trimmed.starts_with("export") {
                trimmed.to_string()
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "// This file was generated by `generate-types`. Do not edit it by hand.\n\n{body}\n"
    )
}

fn main() {
    let check = std::env::args().any(|arg| arg == "--check");
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shared/types.ts");
    let generated = generate_types_content();

    if check {
        let current = fs::read_to_string(&path).unwrap_or_default();
        if current == generated {
            println!("✅ shared/types.ts is up to date");
            return;
        }
        eprintln!("❌ shared/types.ts is stale; run `cargo run --bin generate-types`");
        std::process::exit(1);
    }

    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(&path, generated));
    if let Err(e) = written {
        eprintln!("failed to write {}: {e}", path.display());
        std::process::exit(1);
    }
    println!("✅ TypeScript types written to {}", path.display());
}
