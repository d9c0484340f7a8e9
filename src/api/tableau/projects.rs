use std::error::Error;

use log::info;
use reqwest::StatusCode;
use serde::Deserialize;

use super::session::{check_status, TableauSession};

/// A project folder on the site, with the content counts the server reports
/// when queried with `fields=_all_`.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub parent_project_id: Option<String>,
    pub owner_id: String,
    pub num_projects: u32,
    pub num_workbooks: u32,
    pub num_views: u32,
    pub num_datasources: u32,
}

impl Project {
    /// All projects on the site.
    pub fn list(session: &TableauSession) -> Result<Vec<Project>, Box<dyn Error>> {
        let url = session.site_url("projects?pageSize=1000&fields=_all_");
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: ListProjectsResponse = quick_xml::de::from_str(&response.text()?)?;
        let projects: Vec<Project> = parsed
            .projects
            .project
            .into_iter()
            .map(Project::from)
            .collect();
        if projects.is_empty() {
            info!("No projects returned");
        }
        Ok(projects)
    }
}

impl From<ProjectXml> for Project {
    fn from(xml: ProjectXml) -> Project {
        let counts = xml.contents_counts.unwrap_or_default();
        Project {
            id: xml.id,
            name: xml.name,
            parent_project_id: xml.parent_project_id,
            owner_id: xml.owner.map(|o| o.id).unwrap_or_default(),
            num_projects: counts.project_count,
            num_workbooks: counts.workbook_count,
            num_views: counts.view_count,
            num_datasources: counts.datasource_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListProjectsResponse {
    #[serde(default)]
    projects: ProjectsXml,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectsXml {
    #[serde(default)]
    project: Vec<ProjectXml>,
}

#[derive(Debug, Deserialize)]
struct ProjectXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@parentProjectId")]
    parent_project_id: Option<String>,
    owner: Option<OwnerRef>,
    #[serde(rename = "contentsCounts")]
    contents_counts: Option<ContentsCountsXml>,
}

#[derive(Debug, Deserialize)]
struct OwnerRef {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ContentsCountsXml {
    #[serde(rename = "@projectCount", default)]
    project_count: u32,
    #[serde(rename = "@workbookCount", default)]
    workbook_count: u32,
    #[serde(rename = "@viewCount", default)]
    view_count: u32,
    #[serde(rename = "@datasourceCount", default)]
    datasource_count: u32,
}
