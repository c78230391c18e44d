use std::path::Path;

use tracing::debug;
use url::Url;

use super::PatchError;

/// Appends the `wsdl:service` element Exchange leaves out of `services.wsdl`.
///
/// The upstream document has no service definition because EWS is not hosted
/// at a predefined address. The text is split on `\n`, its last two lines are
/// dropped (the closing `</wsdl:definitions>` and the line before it), and a
/// service bound to `endpoint` is appended together with a new closing tag.
///
/// The line count is taken literally: a document whose trailing structure
/// differs is not detected.
///
/// # Example
///
/// ```rust
/// use ews_client::patch_wsdl_text;
/// use url::Url;
///
/// let endpoint = Url::parse("https://host.example/EWS/Exchange.asmx")?;
/// let wsdl = "<wsdl:definitions>\n<wsdl:portType/>\n\n</wsdl:definitions>";
///
/// let patched = patch_wsdl_text(wsdl, &endpoint);
/// assert!(patched.starts_with("<wsdl:definitions>\n<wsdl:portType/>\n<wsdl:service"));
/// assert!(patched.ends_with("</wsdl:service>\n</wsdl:definitions>"));
/// # Ok::<(), url::ParseError>(())
/// ```
pub fn patch_wsdl_text(wsdl: &str, endpoint: &Url) -> String {
    let mut lines: Vec<&str> = wsdl.split('\n').collect();
    lines.truncate(lines.len().saturating_sub(2));

    let mut patched = lines.join("\n");
    patched.push_str("\n<wsdl:service name=\"ExchangeServices\">");
    patched.push_str(
        "\n<wsdl:port name=\"ExchangeServicePort\" binding=\"tns:ExchangeServiceBinding\">",
    );
    patched.push_str(&format!("\n<soap:address location=\"{endpoint}\"/>"));
    patched.push_str("\n</wsdl:port>");
    patched.push_str("\n</wsdl:service>");
    patched.push_str("\n</wsdl:definitions>");
    patched
}

/// Rewrites the WSDL file at `path` in place with [`patch_wsdl_text`].
///
/// # Errors
///
/// - [`PatchError::PathUnset`] if `path` is `None`; no read is attempted
/// - [`PatchError::Read`] if the file cannot be read as UTF-8 text
/// - [`PatchError::Write`] if the patched text cannot be written back
pub async fn patch_wsdl(path: Option<&Path>, endpoint: &Url) -> Result<(), PatchError> {
    let path = path.ok_or(PatchError::PathUnset)?;

    let wsdl = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PatchError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let patched = patch_wsdl_text(&wsdl, endpoint);

    tokio::fs::write(path, patched)
        .await
        .map_err(|source| PatchError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), %endpoint, "WSDL patched");
    Ok(())
}
