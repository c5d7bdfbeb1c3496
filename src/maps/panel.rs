//! Detail panel reads against a live chromiumoxide page

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::element::Element;

use crate::extraction::{DetailPanel, PanelElement, PanelError, PanelResult};

/// The detail view of the listing currently open in the page
#[derive(Debug, Clone)]
pub struct ChromePanel {
    page: Page,
}

impl ChromePanel {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn query(&self, selector: &str) -> PanelResult<Vec<Element>> {
        self.page
            .find_elements(selector)
            .await
            .map_err(|e| PanelError::new(selector, e))
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl DetailPanel for ChromePanel {
    async fn first_text(&self, selector: &str) -> PanelResult<Option<String>> {
        let Some(element) = self.query(selector).await?.into_iter().next() else {
            return Ok(None);
        };
        element
            .inner_text()
            .await
            .map(trimmed)
            .map_err(|e| PanelError::new(selector, e))
    }

    async fn first_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> PanelResult<Option<String>> {
        let Some(element) = self.query(selector).await?.into_iter().next() else {
            return Ok(None);
        };
        element
            .attribute(attribute)
            .await
            .map(trimmed)
            .map_err(|e| PanelError::new(selector, e))
    }

    async fn elements(&self, selector: &str) -> PanelResult<Vec<PanelElement>> {
        let mut found = Vec::new();

        // An element detaching mid-read only loses that element's attributes
        for element in self.query(selector).await? {
            found.push(PanelElement {
                item_id: trimmed(element.attribute("data-item-id").await.ok().flatten()),
                aria_label: trimmed(element.attribute("aria-label").await.ok().flatten()),
                text: trimmed(element.inner_text().await.ok().flatten()),
                href: trimmed(element.attribute("href").await.ok().flatten()),
            });
        }

        Ok(found)
    }
}
