use std::error::Error;

use log::{debug, info};
use reqwest::StatusCode;
use serde::Deserialize;

use super::session::{check_status, TableauSession};

/// One named filter value applied to a view when rendering it.  The name must
/// match the filter field defined on the report exactly, including casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewFilter {
    pub name: String,
    pub value: String,
}

impl ViewFilter {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> ViewFilter {
        ViewFilter {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A view (report) published on the site.
#[derive(Debug, Clone)]
pub struct View {
    pub id: String,
    pub name: String,
    pub content_url: String,
    pub workbook_id: String,
}

impl View {
    /// Find an existing view by id.
    pub fn get(session: &TableauSession, view_id: &str) -> Result<View, Box<dyn Error>> {
        let url = session.site_url(&format!("views/{}", view_id));
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: GetViewResponse = quick_xml::de::from_str(&response.text()?)?;
        Ok(parsed.view.into())
    }

    /// All views on the site.
    pub fn list(session: &TableauSession) -> Result<Vec<View>, Box<dyn Error>> {
        let url = session.site_url("views?pageSize=1000");
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: ListViewsResponse = quick_xml::de::from_str(&response.text()?)?;
        let views: Vec<View> = parsed.views.view.into_iter().map(View::from).collect();
        if views.is_empty() {
            info!("No views returned");
        }
        Ok(views)
    }

    /// Render the view to a PDF with the given filters applied.  Returns the
    /// raw document bytes.
    pub fn pdf(
        &self,
        session: &TableauSession,
        filters: &[ViewFilter],
    ) -> Result<Vec<u8>, Box<dyn Error>> {
        let url = session.site_url(&format!("views/{}/pdf", self.id));
        debug!("url: {}", url);
        let pairs = filter_query_pairs(filters);
        let response = check_status(
            session.http_get(&url).query(&pairs).send()?,
            StatusCode::OK,
        )?;
        Ok(response.bytes()?.to_vec())
    }

    /// Export the view's underlying data as CSV text.
    pub fn data(&self, session: &TableauSession) -> Result<String, Box<dyn Error>> {
        let url = session.site_url(&format!("views/{}/data", self.id));
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        Ok(response.text()?)
    }
}

/// Each filter goes on the url as `vf_{name}={value}`.  Url-encoding is done
/// by the request builder.
fn filter_query_pairs(filters: &[ViewFilter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (format!("vf_{}", f.name), f.value.clone()))
        .collect()
}

impl From<ViewXml> for View {
    fn from(xml: ViewXml) -> View {
        View {
            id: xml.id,
            name: xml.name,
            content_url: xml.content_url.unwrap_or_default(),
            workbook_id: xml.workbook.map(|w| w.id).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetViewResponse {
    view: ViewXml,
}

#[derive(Debug, Deserialize)]
struct ListViewsResponse {
    #[serde(default)]
    views: ViewsXml,
}

#[derive(Debug, Default, Deserialize)]
struct ViewsXml {
    #[serde(default)]
    view: Vec<ViewXml>,
}

#[derive(Debug, Deserialize)]
struct ViewXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@contentUrl")]
    content_url: Option<String>,
    workbook: Option<WorkbookRef>,
}

#[derive(Debug, Deserialize)]
struct WorkbookRef {
    #[serde(rename = "@id")]
    id: String,
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn parse_get_view_response() -> Result<(), Box<dyn Error>> {
        let body = r#"<tsResponse xmlns="http://tableau.com/api">
            <view id="ad13d3e8-bf32-4884-9578-21d7319b3fd1"
                  name="3PN Seller Invoice"
                  contentUrl="SellerInvoices/sheets/Invoice">
                <workbook id="1f2a3b4c-5d6e-7f8a-9b0c-1d2e3f4a5b6c"/>
                <owner id="9f9e9d9c-8b8a-8f8e-7d7c-7b7a6f6d6e6d"/>
            </view>
        </tsResponse>"#;
        let parsed: GetViewResponse = quick_xml::de::from_str(body)?;
        let view: View = parsed.view.into();
        assert_eq!(view.id, "ad13d3e8-bf32-4884-9578-21d7319b3fd1");
        assert_eq!(view.name, "3PN Seller Invoice");
        assert_eq!(view.workbook_id, "1f2a3b4c-5d6e-7f8a-9b0c-1d2e3f4a5b6c");
        Ok(())
    }

    #[test]
    fn parse_list_views_response() -> Result<(), Box<dyn Error>> {
        let body = r#"<tsResponse xmlns="http://tableau.com/api">
            <pagination pageNumber="1" pageSize="1000" totalAvailable="2"/>
            <views>
                <view id="a1" name="One" contentUrl="wb/sheets/One">
                    <workbook id="wb1"/>
                </view>
                <view id="a2" name="Two" contentUrl="wb/sheets/Two">
                    <workbook id="wb1"/>
                </view>
            </views>
        </tsResponse>"#;
        let parsed: ListViewsResponse = quick_xml::de::from_str(body)?;
        let views: Vec<View> = parsed.views.view.into_iter().map(View::from).collect();
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].name, "Two");
        Ok(())
    }

    #[test]
    fn parse_empty_views_response() -> Result<(), Box<dyn Error>> {
        let body = r#"<tsResponse><views></views></tsResponse>"#;
        let parsed: ListViewsResponse = quick_xml::de::from_str(body)?;
        assert!(parsed.views.view.is_empty());
        Ok(())
    }

    #[test]
    fn filter_pairs_keep_construction_order() {
        let filters = vec![
            ViewFilter::new("Week", "2024-01-01"),
            ViewFilter::new("Seller", "Seller1"),
            ViewFilter::new("Brand", "Acme"),
        ];
        let pairs = filter_query_pairs(&filters);
        assert_eq!(
            pairs,
            vec![
                ("vf_Week".to_string(), "2024-01-01".to_string()),
                ("vf_Seller".to_string(), "Seller1".to_string()),
                ("vf_Brand".to_string(), "Acme".to_string()),
            ]
        );
    }

    #[ignore]
    #[test]
    fn render_pdf() -> Result<(), Box<dyn Error>> {
        dotenvy::from_path(std::path::Path::new(".env/test.env")).unwrap();
        let session = TableauSession::from_env()?;
        let view = View::get(&session, "ad13d3e8-bf32-4884-9578-21d7319b3fd1")?;
        let pdf = view.pdf(
            &session,
            &[
                ViewFilter::new("Week", "2024-01-01"),
                ViewFilter::new("Seller", "Seller1"),
                ViewFilter::new("Brand", "Acme"),
            ],
        )?;
        assert!(!pdf.is_empty());
        session.sign_out()?;
        Ok(())
    }
}
