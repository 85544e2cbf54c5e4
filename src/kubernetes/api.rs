use std::collections::HashMap;

use kube::api::ListParams;

use crate::{Error, Result, metrics::Metrics};

use super::{Object, Resource, ResourceName, Subset};

/// A `kube::Api` that records every request it makes.
pub struct Api<R> {
    api: kube::Api<R>,
    metrics: Metrics,
}

impl<R> Api<R> {
    pub fn new(api: kube::Api<R>, metrics: &Metrics) -> Self {
        Self {
            api,
            metrics: metrics.clone(),
        }
    }
}

impl<R> Api<R>
where
    R: kube::Resource<DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned
        + serde::Serialize,
{
    pub async fn get_opt(&self, name: &ResourceName) -> Result<Option<R>> {
        self.metrics.kubernetes_api_usage_count::<R>("get");
        self.api.get_opt(name).await.map_err(Error::Kube)
    }

    pub async fn list(&self, params: &ListParams) -> Result<Vec<R>> {
        self.metrics.kubernetes_api_usage_count::<R>("list");
        self.api
            .list(params)
            .await
            .map(|list| list.items)
            .map_err(Error::Kube)
    }
}

impl<R> Api<R>
where
    R: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + serde::Serialize,
{
    pub async fn delete<O>(&self, object: &O, resources: Vec<R>) -> Result<()>
    where
        O: Object,
    {
        for resource in resources {
            let resource_name = resource.try_name()?;

            tracing::info!(name =% resource_name, kind =% R::kind(&()), "deleting");
            self.metrics.kubernetes_api_usage_count::<R>("delete");
            self.api
                .delete(&resource_name, &object.delete_params())
                .await
                .map_err(Error::Kube)?;
        }

        Ok(())
    }
}

impl<R> Api<R>
where
    R: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + serde::Serialize,
    R::Spec: Subset,
{
    /// Applies `resources` owned by `object` and deletes every other resource
    /// carrying the owner's label.
    pub async fn sync<O, I>(&self, object: &O, resources: HashMap<I, R>) -> Result<HashMap<I, R>>
    where
        I: PartialEq + Eq + std::hash::Hash,
        O: Object + Resource,
    {
        let (results, delete) = self.update(object, resources).await?;
        self.delete(object, delete).await?;
        Ok(results)
    }

    pub async fn update<O, I>(
        &self,
        object: &O,
        resources: HashMap<I, R>,
    ) -> Result<(HashMap<I, R>, Vec<R>)>
    where
        I: PartialEq + Eq + std::hash::Hash,
        O: Object + Resource,
    {
        let mut resources = resources
            .into_iter()
            .map(|(identifier, resource)| {
                resource.try_name().and_then(|resource_name| {
                    resource
                        .try_with_owner(object)
                        .map(|resource| (resource_name, (identifier, resource)))
                })
            })
            .collect::<Result<HashMap<ResourceName, (I, R)>>>()?;

        for (resource_name, (_, resource)) in &resources {
            match self.get_opt(resource_name).await? {
                Some(api_resource)
                    if resource.spec().is_subset(api_resource.spec())
                        && resource.meta().is_subset(api_resource.meta()) => {}
                _ => {
                    tracing::info!(name =% resource_name, kind =% R::kind(&()), "applying");
                    self.metrics.kubernetes_api_usage_count::<R>("patch");
                    self.api
                        .patch(
                            resource_name,
                            &object.patch_params(),
                            &kube::api::Patch::Apply(&resource),
                        )
                        .await
                        .map_err(Error::Kube)?;
                }
            }
        }

        let mut patched = HashMap::new();
        let mut deprecated = Vec::new();

        for api_resource in self.list(&object.try_owned_list_params()?).await? {
            if let Some((identifier, _)) = resources.remove(&api_resource.try_name()?) {
                patched.insert(identifier, api_resource);
            } else {
                deprecated.push(api_resource);
            }
        }

        if !resources.is_empty() {
            tracing::warn!(
                count = resources.len(),
                "applied resources missing from owned list"
            );
        }

        Ok((patched, deprecated))
    }
}

impl<O> Api<O>
where
    O: Object + Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + serde::Serialize,
{
    /// Patches the status subresource when `status` differs from the
    /// object's current status.
    pub async fn update_status(&self, object: &O, status: O::Status) -> Result<()> {
        match object.status() {
            Some(api_status) if &status == api_status => {}
            _ => {
                self.metrics.kubernetes_api_usage_count::<O>("patch");
                self.api
                    .patch_status(
                        &object.try_name()?,
                        &object.patch_status_params(),
                        &object.patch_status(status),
                    )
                    .await
                    .map_err(Error::Kube)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use http::{Method, StatusCode};
    use k8s_openapi::api::core::v1::Secret;
    use kube::core::ObjectMeta;
    use serde_json::json;

    use crate::{
        kubernetes::{Resource, mock},
        pki::{Pki, PkiSpec, PkiStatus},
    };

    use super::Api;

    const UID: &str = "6f0e3c4a-7d0b-4a8e-9a43-2f3d5c1e8b10";

    fn pki(status: Option<PkiStatus>) -> Pki {
        let mut pki = Pki::new(
            "payments",
            PkiSpec {
                service_name: "payments".into(),
            },
        );
        pki.metadata.namespace = Some("shop".into());
        pki.metadata.uid = Some(UID.into());
        pki.status = status;
        pki
    }

    fn valid() -> PkiStatus {
        PkiStatus {
            state: "valid".into(),
            secret_name: Some("payments".into()),
        }
    }

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("shop".into()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".into(),
                    "pki-operator".into(),
                )])),
                ..Default::default()
            },
            type_: Some("Opaque".into()),
            ..Default::default()
        }
    }

    fn secret_list(items: &[serde_json::Value]) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "SecretList",
            "metadata": {},
            "items": items,
        })
    }

    #[tokio::test]
    async fn update_status_skips_unchanged_status() {
        // arrange
        let (client, verifier) = mock::testcontext();
        let scenario = tokio::spawn(verifier.finish());
        let api = Api::new(kube::Api::<Pki>::namespaced(client, "shop"), &mock::metrics());

        // act
        let result = api.update_status(&pki(Some(valid())), valid()).await;
        drop(api);

        // assert
        assert!(result.is_ok());
        mock::timeout_after_1s(scenario).await;
    }

    #[tokio::test]
    async fn update_status_patches_changed_status() {
        // arrange
        let (client, mut verifier) = mock::testcontext();
        let scenario = tokio::spawn(async move {
            let request = verifier.next().await;
            assert_eq!(Method::PATCH, request.method);
            assert_eq!(
                "/apis/box.com/v1/namespaces/shop/pkis/payments/status",
                request.path
            );
            assert_eq!(
                json!({ "status": { "state": "valid", "secretName": "payments" } }),
                request.body_json()
            );
            request.respond(StatusCode::OK, &pki(Some(valid())));

            verifier.finish().await;
        });
        let api = Api::new(kube::Api::<Pki>::namespaced(client, "shop"), &mock::metrics());

        // act
        let result = api.update_status(&pki(None), valid()).await;
        drop(api);

        // assert
        assert!(result.is_ok());
        mock::timeout_after_1s(scenario).await;
    }

    #[tokio::test]
    async fn update_skips_apply_when_live_resource_matches() {
        // arrange
        let owner = pki(None);
        let live = secret("payments").try_with_owner(&owner).unwrap();

        let (client, mut verifier) = mock::testcontext();
        let response = live.clone();
        let scenario = tokio::spawn(async move {
            let request = verifier.next().await;
            assert_eq!(Method::GET, request.method);
            assert_eq!("/api/v1/namespaces/shop/secrets/payments", request.path);
            request.respond(StatusCode::OK, &response);

            let request = verifier.next().await;
            assert_eq!(Method::GET, request.method);
            assert_eq!("/api/v1/namespaces/shop/secrets", request.path);
            assert!(
                request
                    .query
                    .contains(&format!("labelSelector=box.com%2Fowned-by%3D{UID}"))
            );
            request.respond(
                StatusCode::OK,
                &secret_list(&[serde_json::to_value(&response).unwrap()]),
            );

            verifier.finish().await;
        });
        let api = Api::new(
            kube::Api::<Secret>::namespaced(client, "shop"),
            &mock::metrics(),
        );

        // act
        let result = api
            .update(&owner, HashMap::from([((), secret("payments"))]))
            .await;
        drop(api);

        // assert
        let (patched, deprecated) = result.unwrap();
        assert_eq!(Some(&live), patched.get(&()));
        assert!(deprecated.is_empty());
        mock::timeout_after_1s(scenario).await;
    }

    #[tokio::test]
    async fn update_applies_missing_resource_and_reports_deprecated() {
        // arrange
        let owner = pki(None);
        let stale = secret("payments-old").try_with_owner(&owner).unwrap();

        let (client, mut verifier) = mock::testcontext();
        let scenario = tokio::spawn(async move {
            let request = verifier.next().await;
            assert_eq!(Method::GET, request.method);
            request.fail(StatusCode::NOT_FOUND, "NotFound");

            let request = verifier.next().await;
            assert_eq!(Method::PATCH, request.method);
            assert_eq!("/api/v1/namespaces/shop/secrets/payments", request.path);
            assert!(request.query.contains("fieldManager=pki-operator"));
            assert!(request.query.contains("force=true"));
            let applied = request.body_json();
            assert_eq!(UID, applied["metadata"]["labels"]["box.com/owned-by"]);
            assert_eq!(UID, applied["metadata"]["ownerReferences"][0]["uid"]);
            request.echo();

            let request = verifier.next().await;
            assert_eq!(Method::GET, request.method);
            request.respond(
                StatusCode::OK,
                &secret_list(&[applied, serde_json::to_value(&stale).unwrap()]),
            );

            verifier.finish().await;
        });
        let api = Api::new(
            kube::Api::<Secret>::namespaced(client, "shop"),
            &mock::metrics(),
        );

        // act
        let result = api
            .update(&owner, HashMap::from([((), secret("payments"))]))
            .await;
        drop(api);

        // assert
        let (patched, deprecated) = result.unwrap();
        assert_eq!(
            Some("payments"),
            patched.get(&()).and_then(|s| s.metadata.name.as_deref())
        );
        assert_eq!(1, deprecated.len());
        assert_eq!(Some("payments-old"), deprecated[0].metadata.name.as_deref());
        mock::timeout_after_1s(scenario).await;
    }
}
