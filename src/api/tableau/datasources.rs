use std::error::Error;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use reqwest::StatusCode;
use serde::Deserialize;

use super::session::{check_status, TableauSession};

/// A published datasource on the site.
#[derive(Debug, Clone)]
pub struct Datasource {
    pub id: String,
    pub name: String,
    pub content_url: String,
    pub datasource_type: String,
}

impl Datasource {
    /// Find an existing datasource by id.
    pub fn get(session: &TableauSession, datasource_id: &str) -> Result<Datasource, Box<dyn Error>> {
        let url = session.site_url(&format!("datasources/{}", datasource_id));
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: GetDatasourceResponse = quick_xml::de::from_str(&response.text()?)?;
        Ok(parsed.datasource.into())
    }

    /// All datasources on the site.
    pub fn list(session: &TableauSession) -> Result<Vec<Datasource>, Box<dyn Error>> {
        let url = session.site_url("datasources?pageSize=1000");
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let parsed: ListDatasourcesResponse = quick_xml::de::from_str(&response.text()?)?;
        let datasources: Vec<Datasource> = parsed
            .datasources
            .datasource
            .into_iter()
            .map(Datasource::from)
            .collect();
        if datasources.is_empty() {
            info!("No datasources returned");
        }
        Ok(datasources)
    }

    /// Download the datasource content (a tdsx zip bundle) into
    /// `output_folder` and return the path of the written file.  A `/` in the
    /// datasource name is replaced with `-` to keep the file name flat.
    pub fn download(
        &self,
        session: &TableauSession,
        output_folder: &Path,
    ) -> Result<PathBuf, Box<dyn Error>> {
        let url = session.site_url(&format!("datasources/{}/content", self.id));
        info!("Downloading {} datasource...", self.name);
        let response = check_status(session.http_get(&url).send()?, StatusCode::OK)?;
        let content = response.bytes()?;

        fs::create_dir_all(output_folder)?;
        let file_name = self.name.replace('/', "-");
        let zip_path = output_folder.join(file_name + ".zip");
        info!("Writing downloaded file to {}", zip_path.display());
        fs::write(&zip_path, &content)?;

        Ok(zip_path)
    }
}

/// Pull the first `.hyper` member out of a tdsx zip bundle, flattening its
/// internal path.  Returns the path of the extracted file.
pub fn extract_hyper(
    zip_path: &Path,
    output_folder: &Path,
    output_file_name: Option<&str>,
    delete_zip_file: bool,
) -> Result<PathBuf, Box<dyn Error>> {
    let stem = zip_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("datasource");
    let mut file_name = output_file_name.unwrap_or(stem).to_string();
    if !file_name.ends_with(".hyper") {
        file_name += ".hyper";
    }

    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted: Option<PathBuf> = None;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !entry.name().ends_with(".hyper") {
            continue;
        }
        fs::create_dir_all(output_folder)?;
        let out_path = output_folder.join(&file_name);
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        info!("Created {}", out_path.display());
        extracted = Some(out_path);
        break;
    }

    let out_path =
        extracted.ok_or_else(|| format!("no .hyper member in {}", zip_path.display()))?;

    if delete_zip_file {
        fs::remove_file(zip_path)?;
        info!("Deleted original file: {}", zip_path.display());
    }

    Ok(out_path)
}

impl From<DatasourceXml> for Datasource {
    fn from(xml: DatasourceXml) -> Datasource {
        Datasource {
            id: xml.id,
            name: xml.name,
            content_url: xml.content_url.unwrap_or_default(),
            datasource_type: xml.datasource_type.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetDatasourceResponse {
    datasource: DatasourceXml,
}

#[derive(Debug, Deserialize)]
struct ListDatasourcesResponse {
    #[serde(default)]
    datasources: DatasourcesXml,
}

#[derive(Debug, Default, Deserialize)]
struct DatasourcesXml {
    #[serde(default)]
    datasource: Vec<DatasourceXml>,
}

#[derive(Debug, Deserialize)]
struct DatasourceXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@contentUrl")]
    content_url: Option<String>,
    #[serde(rename = "@type")]
    datasource_type: Option<String>,
}
