//! Company info (advertising) attached to plots.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use city_db::Database;
use city_db::queries::plots;
use city_types::api::{CompanyPlot, PlotCompanyInfo, UpdateCompanyInfoRequest, UploadLogoRequest};
use city_types::models::{CompanyInfo, Plot};

use crate::error::ApiError;
use crate::plots::require_owned_plot;

const SVG_DATA_URI_PREFIX: &str = "data:image/svg+xml;base64,";

/// Shallow syntactic check: an opening `<svg` tag followed somewhere later
/// by a closing `</svg>`. Not an XML or schema validation.
pub fn looks_like_svg(payload: &str) -> bool {
    match (payload.find("<svg"), payload.rfind("</svg>")) {
        (Some(open), Some(close)) => open < close,
        _ => false,
    }
}

/// Inline-embeddable form of an SVG document.
pub fn svg_data_uri(payload: &str) -> String {
    format!("{}{}", SVG_DATA_URI_PREFIX, B64.encode(payload.as_bytes()))
}

/// Set the logo and company name. Website and description already on the
/// plot are kept.
pub fn upload_logo(
    db: &Database,
    user_id: Uuid,
    plot_id: Uuid,
    req: UploadLogoRequest,
) -> Result<CompanyInfo, ApiError> {
    let info = db.with_tx(|tx| {
        let plot = require_owned_plot(tx, user_id, plot_id)?;
        if !looks_like_svg(&req.logo_svg) {
            return Err(ApiError::invalid("logo must be an SVG document"));
        }
        let company_name = required(&req.company_name, "company_name")?;

        let previous = plot.company_info;
        let now = Utc::now();
        let info = CompanyInfo {
            company_name,
            website: previous.as_ref().and_then(|p| p.website.clone()),
            description: previous.as_ref().and_then(|p| p.description.clone()),
            logo: Some(svg_data_uri(&req.logo_svg)),
            uploaded_at: now,
        };
        plots::set_company_info(tx, plot_id, Some(&info), now)?;
        Ok(info)
    })?;

    info!("Logo uploaded for '{}' on plot {}", info.company_name, plot_id);
    Ok(info)
}

/// Replace the company info wholesale. Unlike `upload_logo` nothing from the
/// previous value survives.
pub fn update_company_info(
    db: &Database,
    user_id: Uuid,
    plot_id: Uuid,
    req: UpdateCompanyInfoRequest,
) -> Result<CompanyInfo, ApiError> {
    db.with_tx(|tx| {
        require_owned_plot(tx, user_id, plot_id)?;
        let now = Utc::now();
        let info = CompanyInfo {
            company_name: required(&req.company_name, "company_name")?,
            website: Some(req.website),
            logo: Some(req.logo),
            description: Some(req.description),
            uploaded_at: now,
        };
        plots::set_company_info(tx, plot_id, Some(&info), now)?;
        Ok(info)
    })
}

pub fn remove_company_info(db: &Database, user_id: Uuid, plot_id: Uuid) -> Result<(), ApiError> {
    db.with_tx(|tx| {
        require_owned_plot(tx, user_id, plot_id)?;
        plots::set_company_info(tx, plot_id, None, Utc::now())?;
        Ok::<_, ApiError>(())
    })?;
    info!("Company info removed from plot {}", plot_id);
    Ok(())
}

pub fn get_company_plots(db: &Database) -> Result<Vec<CompanyPlot>, ApiError> {
    let rows = db.with_conn(plots::list_company_plots)?;
    Ok(rows.into_iter().filter_map(company_view).collect())
}

pub fn search_by_company(db: &Database, company_name: &str) -> Result<Vec<CompanyPlot>, ApiError> {
    let rows = db.with_conn(|conn| plots::search_company_plots(conn, company_name))?;
    Ok(rows.into_iter().filter_map(company_view).collect())
}

pub fn get_plot_company_info(db: &Database, plot_id: Uuid) -> Result<PlotCompanyInfo, ApiError> {
    let plot = db
        .with_conn(|conn| plots::get_plot(conn, plot_id))?
        .ok_or(ApiError::NotFound("plot"))?;
    Ok(plot.company_info.into())
}

fn company_view((plot, owner_username): (Plot, String)) -> Option<CompanyPlot> {
    Some(CompanyPlot {
        plot_id: plot.id,
        owner_username,
        position: plot.position,
        size: plot.size,
        company_info: plot.company_info?,
    })
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}
