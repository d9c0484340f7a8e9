use std::error::Error;

use log::{debug, info};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::session::{check_status, TableauSession};

/// A workbook published on the site.
#[derive(Debug, Clone)]
pub struct Workbook {
    pub id: String,
    pub name: String,
    pub content_url: String,
    pub show_tabs: bool,
    pub project_id: String,
    pub owner_name: String,
    pub num_views: usize,
}

/// A datasource connection embedded in a workbook.
#[derive(Debug, Clone)]
pub struct WorkbookConnection {
    pub id: String,
    pub connection_type: String,
    pub server_address: String,
    pub user_name: String,
    pub datasource_id: String,
    pub datasource_name: String,
}

/// Attributes to change on a workbook connection.  Only the supplied ones are
/// sent; the server leaves the rest untouched.
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    pub server_address: Option<String>,
    pub server_port: Option<String>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub embed_password: bool,
}

impl ConnectionUpdate {
    fn is_empty(&self) -> bool {
        self.server_address.is_none()
            && self.server_port.is_none()
            && self.user_name.is_none()
            && self.password.is_none()
    }
}

impl Workbook {
    /// Find an existing workbook by id.
    pub fn get(session: &TableauSession, workbook_id: &str) -> Result<Workbook, Box<dyn Error>> {
        let url = session.site_url(&format!("workbooks/{}", workbook_id));
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: GetWorkbookResponse = quick_xml::de::from_str(&response.text()?)?;
        Ok(parsed.workbook.into())
    }

    /// All workbooks on the site.
    pub fn list(session: &TableauSession) -> Result<Vec<Workbook>, Box<dyn Error>> {
        let url = session.site_url("workbooks?pageSize=1000");
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: ListWorkbooksResponse = quick_xml::de::from_str(&response.text()?)?;
        let workbooks: Vec<Workbook> = parsed
            .workbooks
            .workbook
            .into_iter()
            .map(Workbook::from)
            .collect();
        if workbooks.is_empty() {
            info!("No workbooks returned");
        }
        Ok(workbooks)
    }

    /// The datasource connections of this workbook.
    pub fn connections(
        &self,
        session: &TableauSession,
    ) -> Result<Vec<WorkbookConnection>, Box<dyn Error>> {
        let url = session.site_url(&format!("workbooks/{}/connections", self.id));
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: ConnectionsResponse = quick_xml::de::from_str(&response.text()?)?;
        Ok(parsed
            .connections
            .connection
            .into_iter()
            .map(WorkbookConnection::from)
            .collect())
    }

    /// Repoint one connection of this workbook.  Returns false (and makes no
    /// request) when the update carries no attribute, matching the server
    /// behavior of ignoring an empty `<connection>` element.
    pub fn update_connection(
        &self,
        session: &TableauSession,
        connection_id: &str,
        update: &ConnectionUpdate,
    ) -> Result<bool, Box<dyn Error>> {
        if update.is_empty() {
            info!("No connection attributes supplied. Nothing to update.");
            return Ok(false);
        }
        let url = session.site_url(&format!(
            "workbooks/{}/connections/{}",
            self.id, connection_id
        ));
        let body = connection_request_xml(update)?;
        debug!("xml_request: {}", body);
        check_status(session.http_put(&url).body(body).send()?, StatusCode::OK)?;
        debug!("Finished updating connection.");
        Ok(true)
    }
}

fn connection_request_xml(update: &ConnectionUpdate) -> Result<String, Box<dyn Error>> {
    let request = ConnectionRequest {
        connection: ConnectionXmlOut {
            server_address: update.server_address.as_deref(),
            server_port: update.server_port.as_deref(),
            user_name: update.user_name.as_deref(),
            password: update.password.as_deref(),
            embed_password: update.embed_password,
        },
    };
    let mut body = String::new();
    let serializer = quick_xml::se::Serializer::with_root(&mut body, Some("tsRequest"))?;
    request.serialize(serializer)?;
    Ok(body)
}

impl From<WorkbookXml> for Workbook {
    fn from(xml: WorkbookXml) -> Workbook {
        Workbook {
            id: xml.id,
            name: xml.name,
            content_url: xml.content_url.unwrap_or_default(),
            show_tabs: xml.show_tabs.as_deref() == Some("true"),
            project_id: xml.project.map(|p| p.id).unwrap_or_default(),
            owner_name: xml.owner.and_then(|o| o.name).unwrap_or_default(),
            num_views: xml.views.view.len(),
        }
    }
}

impl From<ConnectionXml> for WorkbookConnection {
    fn from(xml: ConnectionXml) -> WorkbookConnection {
        WorkbookConnection {
            id: xml.id,
            connection_type: xml.connection_type.unwrap_or_default(),
            server_address: xml.server_address.unwrap_or_default(),
            user_name: xml.user_name.unwrap_or_default(),
            datasource_id: xml.datasource.as_ref().map(|d| d.id.clone()).unwrap_or_default(),
            datasource_name: xml.datasource.and_then(|d| d.name).unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct ConnectionRequest<'a> {
    connection: ConnectionXmlOut<'a>,
}

#[derive(Serialize)]
struct ConnectionXmlOut<'a> {
    #[serde(rename = "@serverAddress", skip_serializing_if = "Option::is_none")]
    server_address: Option<&'a str>,
    #[serde(rename = "@serverPort", skip_serializing_if = "Option::is_none")]
    server_port: Option<&'a str>,
    #[serde(rename = "@userName", skip_serializing_if = "Option::is_none")]
    user_name: Option<&'a str>,
    #[serde(rename = "@password", skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(rename = "@embedPassword")]
    embed_password: bool,
}

#[derive(Debug, Deserialize)]
struct GetWorkbookResponse {
    workbook: WorkbookXml,
}

#[derive(Debug, Deserialize)]
struct ListWorkbooksResponse {
    #[serde(default)]
    workbooks: WorkbooksXml,
}

#[derive(Debug, Default, Deserialize)]
struct WorkbooksXml {
    #[serde(default)]
    workbook: Vec<WorkbookXml>,
}

#[derive(Debug, Deserialize)]
struct WorkbookXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@contentUrl")]
    content_url: Option<String>,
    #[serde(rename = "@showTabs")]
    show_tabs: Option<String>,
    project: Option<ProjectRef>,
    owner: Option<OwnerRef>,
    #[serde(default)]
    views: ViewsRef,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct OwnerRef {
    #[serde(rename = "@name")]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ViewsRef {
    #[serde(default)]
    view: Vec<ViewRef>,
}

#[derive(Debug, Deserialize)]
struct ViewRef {
    #[serde(rename = "@id")]
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsResponse {
    #[serde(default)]
    connections: ConnectionsXml,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectionsXml {
    #[serde(default)]
    connection: Vec<ConnectionXml>,
}

#[derive(Debug, Deserialize)]
struct ConnectionXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    connection_type: Option<String>,
    #[serde(rename = "@serverAddress")]
    server_address: Option<String>,
    #[serde(rename = "@userName")]
    user_name: Option<String>,
    datasource: Option<DatasourceRef>,
}

#[derive(Debug, Deserialize)]
struct DatasourceRef {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn parse_get_workbook_response() -> Result<(), Box<dyn Error>> {
        let body = r#"<tsResponse xmlns="http://tableau.com/api">
            <workbook id="1f2a3b4c" name="Seller Invoices" contentUrl="SellerInvoices"
                      showTabs="false">
                <project id="p1"/>
                <owner id="u1" name="analyst@example.com"/>
                <views>
                    <view id="v1" name="Invoice"/>
                    <view id="v2" name="Summary"/>
                </views>
            </workbook>
        </tsResponse>"#;
        let parsed: GetWorkbookResponse = quick_xml::de::from_str(body)?;
        let workbook: Workbook = parsed.workbook.into();
        assert_eq!(workbook.id, "1f2a3b4c");
        assert!(!workbook.show_tabs);
        assert_eq!(workbook.project_id, "p1");
        assert_eq!(workbook.owner_name, "analyst@example.com");
        assert_eq!(workbook.num_views, 2);
        Ok(())
    }

    #[test]
    fn parse_connections_response() -> Result<(), Box<dyn Error>> {
        let body = r#"<tsResponse xmlns="http://tableau.com/api">
            <connections>
                <connection id="c1" type="snowflake"
                            serverAddress="acme.warehouse.example.com" userName="svc_tableau">
                    <datasource id="d1" name="Shipments"/>
                </connection>
            </connections>
        </tsResponse>"#;
        let parsed: ConnectionsResponse = quick_xml::de::from_str(body)?;
        let connections: Vec<WorkbookConnection> = parsed
            .connections
            .connection
            .into_iter()
            .map(WorkbookConnection::from)
            .collect();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].connection_type, "snowflake");
        assert_eq!(connections[0].datasource_name, "Shipments");
        Ok(())
    }

    #[test]
    fn connection_request_carries_only_supplied_attributes() -> Result<(), Box<dyn Error>> {
        let update = ConnectionUpdate {
            server_address: Some("warehouse.example.com".to_string()),
            user_name: Some("svc_tableau".to_string()),
            embed_password: true,
            ..Default::default()
        };
        let xml = connection_request_xml(&update)?;
        assert_eq!(
            xml,
            "<tsRequest><connection serverAddress=\"warehouse.example.com\" \
             userName=\"svc_tableau\" embedPassword=\"true\"/></tsRequest>"
        );
        Ok(())
    }

    #[test]
    fn empty_connection_update() {
        assert!(ConnectionUpdate::default().is_empty());
        let update = ConnectionUpdate {
            server_port: Some("443".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
