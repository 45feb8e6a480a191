//! Field mapping from enriched CRM data to an [`OpportunityRecord`].

use chrono::DateTime;

use oppsync_shared::{
    Company, FlatProperties, OppSyncError, OpportunityConfig, OpportunityDetail,
    OpportunityRecord, Owner, Result,
};

use crate::industry::map_industry;

/// Status given to every newly created opportunity.
const DRAFT_STATUS: &str = "Draft";

/// Everything a record is assembled from, after all lookups succeeded.
#[derive(Debug, Clone)]
pub struct EnrichedDeal {
    pub properties: FlatProperties,
    pub company: Company,
    pub owner: Owner,
    /// Cleaned note bodies, newline-joined.
    pub notes: String,
}

/// Fill the fields absent from `fetched` with the matching `default` field.
///
/// A fetched value always wins, even an empty string. Without a fetched
/// company the default is returned unchanged.
pub fn resolve_company(fetched: Option<Company>, default: &Company) -> Company {
    let Some(fetched) = fetched else {
        return default.clone();
    };

    Company {
        name: fetched.name.or_else(|| default.name.clone()),
        domain: fetched.domain.or_else(|| default.domain.clone()),
        country: fetched.country.or_else(|| default.country.clone()),
        zip: fetched.zip.or_else(|| default.zip.clone()),
        industry_sector: fetched
            .industry_sector
            .or_else(|| default.industry_sector.clone()),
    }
}

/// Format an epoch-milliseconds string as a UTC `YYYY-MM-DD` date.
pub fn format_close_date(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(OppSyncError::validation("close date is missing"));
    }

    let millis: i64 = raw
        .parse()
        .map_err(|_| OppSyncError::validation(format!("close date '{raw}' is not an epoch timestamp")))?;

    DateTime::from_timestamp_millis(millis)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| OppSyncError::validation(format!("close date '{raw}' is out of range")))
}

/// Assemble the stored document for one deal.
pub fn build_record(deal: &EnrichedDeal, constants: &OpportunityConfig) -> Result<OpportunityRecord> {
    let target_close_date = format_close_date(deal.properties.close_date())?;
    let deal_name = deal.properties.deal_name();
    let company = &deal.company;

    let customer_company_name = match company.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => deal_name.to_string(),
    };

    let detail = OpportunityDetail {
        status: DRAFT_STATUS.to_string(),
        customer_company_name,
        country: company.country.clone().unwrap_or_default(),
        postal_code: company.zip.clone().unwrap_or_default(),
        customer_title: String::new(),
        customer_phone: String::new(),
        customer_last_name: String::new(),
        customer_first_name: String::new(),
        customer_email: String::new(),
        customer_website: company.domain.clone().unwrap_or_default(),
        partner_project_title: deal_name.to_string(),
        delivery_model: constants.delivery_model.clone(),
        expected_monthly_aws_revenue: constants.expected_monthly_revenue,
        partner_primary_need_from_aws: constants.partner_primary_need.clone(),
        target_close_date,
        primary_contact_last_name: deal.owner.last_name.clone(),
        primary_contact_first_name: deal.owner.first_name.clone(),
        primary_contact_email: deal.owner.email.clone(),
        industry: company
            .industry_sector
            .as_deref()
            .and_then(map_industry)
            .map(str::to_string),
        project_description: deal.notes.clone(),
        aws_account_owner_name: constants.account_owner_name.clone(),
        aws_account_owner_email: constants.account_owner_email.clone(),
        aws_account_id: constants.account_id.clone(),
    };

    Ok(OpportunityRecord {
        version: constants.version.clone(),
        spms_id: constants.spms_id.clone(),
        opportunities: vec![detail],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oppsync_shared::{DefaultCompanyConfig, WebhookEvent};

    fn properties(deal_name: &str, close_date: &str) -> FlatProperties {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "objectId": "42",
            "properties": {
                "dealname": {"value": deal_name},
                "closedate": {"value": close_date},
                "hubspot_owner_id": {"value": "7"}
            }
        }))
        .unwrap();
        event.flatten()
    }

    fn deal(company: Company) -> EnrichedDeal {
        EnrichedDeal {
            properties: properties("Data platform migration", "1700000000000"),
            company,
            owner: Owner {
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                email: "jane@acme.fr".into(),
            },
            notes: "Kickoff done".into(),
        }
    }

    fn default_company() -> Company {
        Company::from(&DefaultCompanyConfig::default())
    }

    #[test]
    fn close_date_is_utc_calendar_day() {
        assert_eq!(format_close_date("1700000000000").unwrap(), "2023-11-14");
        assert_eq!(format_close_date("0").unwrap(), "1970-01-01");
    }

    #[test]
    fn non_numeric_close_date_fails_validation() {
        for raw in ["soon", "", "2023-11-14", "1.7e12"] {
            let err = format_close_date(raw).unwrap_err();
            assert!(matches!(err, OppSyncError::Validation { .. }), "{raw}");
        }
    }

    #[test]
    fn no_company_yields_the_default() {
        let company = resolve_company(None, &default_company());
        assert_eq!(company.domain.as_deref(), Some("theodo.fr"));
        assert_eq!(company.country.as_deref(), Some("France"));
        assert_eq!(company.zip.as_deref(), Some("75017"));
        assert_eq!(company.name.as_deref(), Some(""));
    }

    #[test]
    fn default_fills_only_absent_fields() {
        let fetched = Company {
            name: Some("Acme".into()),
            domain: None,
            country: Some("Belgium".into()),
            zip: Some(String::new()),
            industry_sector: None,
        };
        let company = resolve_company(Some(fetched), &default_company());
        assert_eq!(company.name.as_deref(), Some("Acme"));
        assert_eq!(company.domain.as_deref(), Some("theodo.fr"));
        assert_eq!(company.country.as_deref(), Some("Belgium"));
        assert_eq!(company.zip.as_deref(), Some(""));
        assert_eq!(company.industry_sector.as_deref(), Some(""));
    }

    #[test]
    fn company_name_wins_over_deal_name() {
        let mut company = default_company();
        company.name = Some("Acme".into());
        let record = build_record(&deal(company), &OpportunityConfig::default()).unwrap();
        let detail = &record.opportunities[0];
        assert_eq!(detail.customer_company_name, "Acme");
        assert_eq!(detail.partner_project_title, "Data platform migration");
    }

    #[test]
    fn empty_company_name_falls_back_to_deal_name() {
        let record = build_record(&deal(default_company()), &OpportunityConfig::default()).unwrap();
        assert_eq!(record.opportunities[0].customer_company_name, "Data platform migration");
    }

    #[test]
    fn record_carries_constants_and_owner() {
        let record = build_record(&deal(default_company()), &OpportunityConfig::default()).unwrap();
        assert_eq!(record.version, "1");
        assert_eq!(record.spms_id, "spmsId");
        assert_eq!(record.opportunities.len(), 1);

        let detail = &record.opportunities[0];
        assert_eq!(detail.status, "Draft");
        assert_eq!(detail.delivery_model, "Managed Services");
        assert_eq!(detail.expected_monthly_aws_revenue, 100.0);
        assert_eq!(detail.target_close_date, "2023-11-14");
        assert_eq!(detail.primary_contact_first_name, "Jane");
        assert_eq!(detail.primary_contact_email, "jane@acme.fr");
        assert_eq!(detail.customer_website, "theodo.fr");
        assert_eq!(detail.project_description, "Kickoff done");
        assert_eq!(detail.aws_account_id, "111111111111");
    }

    #[test]
    fn unmapped_industry_is_omitted_from_json() {
        let mut company = default_company();
        company.industry_sector = Some("99".into());
        let record = build_record(&deal(company), &OpportunityConfig::default()).unwrap();
        assert_eq!(record.opportunities[0].industry, None);

        let json = serde_json::to_value(&record).unwrap();
        let detail = &json["opportunities"][0];
        assert!(detail.get("industry").is_none());
        assert_eq!(detail["aWSAccountOwnerName"], "TEST owner name");
        assert_eq!(detail["targetCloseDate"], "2023-11-14");
    }

    #[test]
    fn mapped_industry_is_set() {
        let mut company = default_company();
        company.industry_sector = Some("45".into());
        let record = build_record(&deal(company), &OpportunityConfig::default()).unwrap();
        assert_eq!(record.opportunities[0].industry.as_deref(), Some("Software and Internet"));
    }

    #[test]
    fn bad_close_date_fails_assembly() {
        let mut bad = deal(default_company());
        bad.properties = properties("Deal", "next week");
        let err = build_record(&bad, &OpportunityConfig::default()).unwrap_err();
        assert!(matches!(err, OppSyncError::Validation { .. }));
    }
}
