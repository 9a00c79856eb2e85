//! Cached access to account-scoped IP lists

use std::collections::HashMap;

use tracing::{debug, warn};

use super::Handle;
use crate::config::WafListConfig;
use crate::error::Result;
use crate::ip::IpPrefix;
use crate::traits::{WafList, WafListItem};

impl Handle {
    /// IP lists of an account, by name, through the cache
    ///
    /// Lists of other kinds are left out.
    pub async fn list_lists(&self, account_id: &str) -> Result<HashMap<String, WafList>> {
        let key = account_id.to_string();
        if let Some(lists) = self.caches.lists.get(&key).await {
            debug!(account = %account_id, "list index cache hit");
            return Ok(lists);
        }

        let lists: HashMap<String, WafList> = self
            .api
            .list_lists(account_id)
            .await?
            .into_iter()
            .filter(WafList::is_ip_list)
            .map(|list| (list.name.clone(), list))
            .collect();

        self.caches.lists.set(key, lists.clone()).await;
        Ok(lists)
    }

    /// Look up a list by name
    pub async fn find_list(&self, list: &WafListConfig) -> Result<Option<WafList>> {
        let mut lists = self.list_lists(&list.account_id).await?;
        Ok(lists.remove(&list.name))
    }

    /// Find the list, creating it if missing
    ///
    /// Returns the list and whether it was created by this call.
    pub async fn ensure_list(&self, list: &WafListConfig) -> Result<(WafList, bool)> {
        if let Some(existing) = self.find_list(list).await? {
            if !list.description.is_empty() && existing.description != list.description {
                warn!(
                    list = %list.describe(),
                    expected = %list.description,
                    actual = %existing.description,
                    "IP list description differs from the configured one; leaving it unchanged"
                );
            }
            return Ok((existing, false));
        }

        let account_key = list.account_id.clone();
        match self
            .api
            .create_list(&list.account_id, &list.name, &list.description)
            .await
        {
            Ok(created) => {
                let inserted = created.clone();
                self.caches
                    .lists
                    .update(&account_key, move |lists| {
                        lists.insert(inserted.name.clone(), inserted);
                    })
                    .await;
                self.caches
                    .list_items
                    .set(created.id.clone(), Vec::new())
                    .await;
                Ok((created, true))
            }
            Err(e) => {
                self.caches.lists.invalidate(&account_key).await;
                Err(e)
            }
        }
    }

    /// Delete a list; on success it disappears from the cached index
    pub async fn delete_list(&self, list: &WafListConfig, list_id: &str) -> Result<()> {
        let account_key = list.account_id.clone();
        let items_key = list_id.to_string();
        let result = self.api.delete_list(&list.account_id, list_id).await;

        match &result {
            Ok(()) => {
                self.caches
                    .lists
                    .update(&account_key, |lists| {
                        lists.retain(|_, l| l.id != list_id);
                    })
                    .await;
            }
            Err(_) => self.caches.lists.invalidate(&account_key).await,
        }
        self.caches.list_items.invalidate(&items_key).await;

        result
    }

    /// Items of a list, through the cache
    pub async fn list_list_items(
        &self,
        list: &WafListConfig,
        list_id: &str,
    ) -> Result<Vec<WafListItem>> {
        let key = list_id.to_string();
        if let Some(items) = self.caches.list_items.get(&key).await {
            debug!(list = %list.describe(), "list item cache hit");
            return Ok(items);
        }

        let items = self.api.list_list_items(&list.account_id, list_id).await?;
        self.caches.list_items.set(key, items.clone()).await;
        Ok(items)
    }

    /// Add prefixes to a list; on success the created items are cached
    pub async fn create_list_items(
        &self,
        list: &WafListConfig,
        list_id: &str,
        prefixes: &[IpPrefix],
    ) -> Result<Vec<WafListItem>> {
        let key = list_id.to_string();
        match self
            .api
            .create_list_items(&list.account_id, list_id, prefixes, &list.item_comment)
            .await
        {
            Ok(created) => {
                let appended = created.clone();
                self.caches
                    .list_items
                    .update(&key, move |items| items.extend(appended))
                    .await;
                Ok(created)
            }
            Err(e) => {
                self.caches.list_items.invalidate(&key).await;
                Err(e)
            }
        }
    }

    /// Remove items from a list; on success they leave the cached copy
    pub async fn delete_list_items(
        &self,
        list: &WafListConfig,
        list_id: &str,
        item_ids: &[String],
    ) -> Result<()> {
        let key = list_id.to_string();
        match self
            .api
            .delete_list_items(&list.account_id, list_id, item_ids)
            .await
        {
            Ok(()) => {
                self.caches
                    .list_items
                    .update(&key, |items| items.retain(|item| !item_ids.contains(&item.id)))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.caches.list_items.invalidate(&key).await;
                Err(e)
            }
        }
    }

    /// Start replacing the content of a list
    ///
    /// The provider finishes the operation later, so the cached items are
    /// dropped whatever the outcome.
    pub async fn replace_list_items(
        &self,
        list: &WafListConfig,
        list_id: &str,
        prefixes: &[IpPrefix],
    ) -> Result<()> {
        let result = self
            .api
            .replace_list_items(&list.account_id, list_id, prefixes)
            .await;
        self.caches.list_items.invalidate(&list_id.to_string()).await;
        result
    }
}
