//! Distribution lists, security groups and Microsoft 365 groups.
//!
//! The three tools share one executor; the group kind fixes creation defaults and the
//! filter applied to `list`.

use reqwest::Method;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{
    directory_object_ref, for_each_id, json_result, list_request, mail_nickname, patch_body,
    require_non_empty, text_result, tool, upstream_result, Hints, ListQuery,
};

pub const DISTRIBUTION_LISTS: &str = "manage_distribution_lists";
pub const SECURITY_GROUPS: &str = "manage_security_groups";
pub const M365_GROUPS: &str = "manage_m365_groups";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Distribution,
    Security,
    Microsoft365,
}

impl GroupKind {
    fn label(self) -> &'static str {
        match self {
            GroupKind::Distribution => "Distribution list",
            GroupKind::Security => "Security group",
            GroupKind::Microsoft365 => "Microsoft 365 group",
        }
    }

    fn list_filter(self) -> &'static str {
        match self {
            GroupKind::Distribution => "mailEnabled eq true and securityEnabled eq false",
            GroupKind::Security => "securityEnabled eq true",
            GroupKind::Microsoft365 => "groupTypes/any(c:c eq 'Unified')",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub group_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub display_name: String,
    pub description: Option<String>,
    /// Defaults to the display name, lowercased with whitespace removed.
    pub mail_nickname: Option<String>,
    /// Security groups only; defaults to false.
    pub mail_enabled: Option<bool>,
    /// Microsoft 365 groups only: `Private` (default) or `Public`.
    pub visibility: Option<String>,
    /// Owners bound at creation (user object ids).
    #[serde(default)]
    pub owner_ids: Vec<String>,
    /// Members bound at creation (directory object ids).
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    pub group_id: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub mail_nickname: Option<String>,
    pub visibility: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberChange {
    pub group_id: String,
    pub member_ids: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerChange {
    pub group_id: String,
    pub owner_ids: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberListing {
    pub group_id: String,
    pub top: Option<u32>,
}

/// Actions for distribution lists and security groups.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GroupArgs {
    Get(GroupRef),
    List(ListQuery),
    Create(NewGroup),
    Update(GroupUpdate),
    Delete(GroupRef),
    AddMembers(MemberChange),
    RemoveMembers(MemberChange),
    ListMembers(MemberListing),
}

/// Actions for Microsoft 365 groups, which also manage owners.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum M365GroupArgs {
    Get(GroupRef),
    List(ListQuery),
    Create(NewGroup),
    Update(GroupUpdate),
    Delete(GroupRef),
    AddMembers(MemberChange),
    RemoveMembers(MemberChange),
    ListMembers(MemberListing),
    AddOwners(OwnerChange),
    RemoveOwners(OwnerChange),
}

enum GroupOp {
    Get(GroupRef),
    List(ListQuery),
    Create(NewGroup),
    Update(GroupUpdate),
    Delete(GroupRef),
    AddMembers(MemberChange),
    RemoveMembers(MemberChange),
    ListMembers(MemberListing),
    AddOwners(OwnerChange),
    RemoveOwners(OwnerChange),
}

impl From<GroupArgs> for GroupOp {
    fn from(args: GroupArgs) -> Self {
        match args {
            GroupArgs::Get(r) => GroupOp::Get(r),
            GroupArgs::List(q) => GroupOp::List(q),
            GroupArgs::Create(g) => GroupOp::Create(g),
            GroupArgs::Update(u) => GroupOp::Update(u),
            GroupArgs::Delete(r) => GroupOp::Delete(r),
            GroupArgs::AddMembers(m) => GroupOp::AddMembers(m),
            GroupArgs::RemoveMembers(m) => GroupOp::RemoveMembers(m),
            GroupArgs::ListMembers(l) => GroupOp::ListMembers(l),
        }
    }
}

impl From<M365GroupArgs> for GroupOp {
    fn from(args: M365GroupArgs) -> Self {
        match args {
            M365GroupArgs::Get(r) => GroupOp::Get(r),
            M365GroupArgs::List(q) => GroupOp::List(q),
            M365GroupArgs::Create(g) => GroupOp::Create(g),
            M365GroupArgs::Update(u) => GroupOp::Update(u),
            M365GroupArgs::Delete(r) => GroupOp::Delete(r),
            M365GroupArgs::AddMembers(m) => GroupOp::AddMembers(m),
            M365GroupArgs::RemoveMembers(m) => GroupOp::RemoveMembers(m),
            M365GroupArgs::ListMembers(l) => GroupOp::ListMembers(l),
            M365GroupArgs::AddOwners(o) => GroupOp::AddOwners(o),
            M365GroupArgs::RemoveOwners(o) => GroupOp::RemoveOwners(o),
        }
    }
}

pub(super) fn definitions() -> Result<Vec<Tool>, ToolError> {
    Ok(vec![
        tool::<GroupArgs>(
            DISTRIBUTION_LISTS,
            "Manage Exchange distribution lists (mail-enabled, non-security groups): get, list, \
             create, update, delete and member management.",
            Hints::WRITE,
        )?,
        tool::<GroupArgs>(
            SECURITY_GROUPS,
            "Manage Entra ID security groups: get, list, create, update, delete and member management.",
            Hints::WRITE,
        )?,
        tool::<M365GroupArgs>(
            M365_GROUPS,
            "Manage Microsoft 365 (Unified) groups, including members and owners.",
            Hints::WRITE,
        )?,
    ])
}

fn non_blank(field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Request body for group creation with the kind's defaults applied.
pub fn create_body(kind: GroupKind, new: &NewGroup, graph_base: &str) -> Result<Value, ToolError> {
    non_blank("displayName", &new.display_name)?;
    let nickname = new
        .mail_nickname
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| mail_nickname(&new.display_name));

    let (mail_enabled, security_enabled, group_types) = match kind {
        GroupKind::Distribution => (true, false, json!([])),
        GroupKind::Security => (new.mail_enabled.unwrap_or(false), true, json!([])),
        GroupKind::Microsoft365 => (true, false, json!(["Unified"])),
    };

    let mut body = Map::new();
    body.insert("displayName".into(), json!(new.display_name));
    body.insert("mailNickname".into(), json!(nickname));
    body.insert("mailEnabled".into(), json!(mail_enabled));
    body.insert("securityEnabled".into(), json!(security_enabled));
    body.insert("groupTypes".into(), group_types);
    if let Some(d) = &new.description {
        body.insert("description".into(), json!(d));
    }
    if kind == GroupKind::Microsoft365 {
        let visibility = new.visibility.as_deref().unwrap_or("Private");
        body.insert("visibility".into(), json!(visibility));
    }
    let bind = |ids: &[String]| -> Value {
        ids.iter()
            .map(|id| directory_object_ref(graph_base, id)["@odata.id"].clone())
            .collect()
    };
    if !new.owner_ids.is_empty() {
        body.insert("owners@odata.bind".into(), bind(&new.owner_ids));
    }
    if !new.member_ids.is_empty() {
        body.insert("members@odata.bind".into(), bind(&new.member_ids));
    }
    Ok(Value::Object(body))
}

pub(super) async fn run_groups(
    client: &GraphClient,
    kind: GroupKind,
    args: GroupArgs,
) -> Result<CallToolResult, ToolError> {
    execute(client, kind, args.into()).await
}

pub(super) async fn run_m365_groups(
    client: &GraphClient,
    args: M365GroupArgs,
) -> Result<CallToolResult, ToolError> {
    execute(client, GroupKind::Microsoft365, args.into()).await
}

async fn execute(
    client: &GraphClient,
    kind: GroupKind,
    op: GroupOp,
) -> Result<CallToolResult, ToolError> {
    match op {
        GroupOp::Get(r) => {
            non_blank("groupId", &r.group_id)?;
            json_result(&client.get(&format!("/groups/{}", seg(&r.group_id))).await?)
        }
        GroupOp::List(query) => {
            let req = query
                .apply_with_filter(ApiRequest::graph(Method::GET, "/groups"), kind.list_filter())
                .query("$count", "true")
                .header("ConsistencyLevel", "eventual");
            json_result(&client.send_json(req).await?)
        }
        GroupOp::Create(new) => {
            let body = create_body(kind, &new, &client.endpoints().graph_base)?;
            json_result(&client.post("/groups", body).await?)
        }
        GroupOp::Update(u) => {
            non_blank("groupId", &u.group_id)?;
            let visibility = match kind {
                GroupKind::Microsoft365 => u.visibility.map(Value::String),
                _ => None,
            };
            let body = patch_body(&[
                ("displayName", u.display_name.map(Value::String)),
                ("description", u.description.map(Value::String)),
                ("mailNickname", u.mail_nickname.map(Value::String)),
                ("visibility", visibility),
            ])?;
            let resp = client
                .patch(&format!("/groups/{}", seg(&u.group_id)), body)
                .await?;
            upstream_result(resp, &format!("{} updated", kind.label()))
        }
        GroupOp::Delete(r) => {
            non_blank("groupId", &r.group_id)?;
            let resp = client.delete(&format!("/groups/{}", seg(&r.group_id))).await?;
            upstream_result(resp, &format!("{} deleted", kind.label()))
        }
        GroupOp::AddMembers(m) => {
            change_links(client, &m.group_id, "members", &m.member_ids, true).await
        }
        GroupOp::RemoveMembers(m) => {
            change_links(client, &m.group_id, "members", &m.member_ids, false).await
        }
        GroupOp::AddOwners(o) => {
            change_links(client, &o.group_id, "owners", &o.owner_ids, true).await
        }
        GroupOp::RemoveOwners(o) => {
            change_links(client, &o.group_id, "owners", &o.owner_ids, false).await
        }
        GroupOp::ListMembers(l) => {
            non_blank("groupId", &l.group_id)?;
            let query = ListQuery {
                top: l.top,
                ..Default::default()
            };
            let req = list_request(format!("/groups/{}/members", seg(&l.group_id)), &query);
            json_result(&client.send_json(req).await?)
        }
    }
}

/// Add or remove `members`/`owners` references, one request per id.
async fn change_links(
    client: &GraphClient,
    group_id: &str,
    relation: &str,
    ids: &[String],
    add: bool,
) -> Result<CallToolResult, ToolError> {
    non_blank("groupId", group_id)?;
    let field = if relation == "owners" { "ownerIds" } else { "memberIds" };
    require_non_empty(field, ids)?;
    let group = seg(group_id);
    let graph_base = client.endpoints().graph_base.clone();

    let count = if add {
        for_each_id("add", ids, |id| {
            let path = format!("/groups/{}/{}/$ref", group, relation);
            let body = directory_object_ref(&graph_base, id);
            async move { client.post(&path, body).await }
        })
        .await?
    } else {
        for_each_id("remove", ids, |id| {
            let path = format!("/groups/{}/{}/{}/$ref", group, relation, seg(id));
            async move { client.delete(&path).await }
        })
        .await?
    };

    let verb = if add { "Added" } else { "Removed" };
    let preposition = if add { "to" } else { "from" };
    Ok(text_result(format!(
        "{} {} {} {} group {}",
        verb,
        count,
        relation,
        preposition,
        group_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_group(name: &str) -> NewGroup {
        NewGroup {
            display_name: name.into(),
            description: None,
            mail_nickname: None,
            mail_enabled: None,
            visibility: None,
            owner_ids: vec![],
            member_ids: vec![],
        }
    }

    const BASE: &str = "https://graph.microsoft.com";

    #[test]
    fn security_group_defaults() {
        let body = create_body(GroupKind::Security, &new_group("Sales Team"), BASE).unwrap();
        assert_eq!(
            body,
            json!({
                "displayName": "Sales Team",
                "mailNickname": "salesteam",
                "mailEnabled": false,
                "securityEnabled": true,
                "groupTypes": []
            })
        );
    }

    #[test]
    fn distribution_list_defaults() {
        let body = create_body(GroupKind::Distribution, &new_group("All Staff"), BASE).unwrap();
        assert_eq!(body["mailEnabled"], true);
        assert_eq!(body["securityEnabled"], false);
        assert_eq!(body["mailNickname"], "allstaff");
    }

    #[test]
    fn m365_group_defaults_and_bindings() {
        let mut g = new_group("Project X");
        g.owner_ids = vec!["u1".into()];
        let body = create_body(GroupKind::Microsoft365, &g, BASE).unwrap();
        assert_eq!(body["groupTypes"], json!(["Unified"]));
        assert_eq!(body["visibility"], "Private");
        assert_eq!(
            body["owners@odata.bind"],
            json!(["https://graph.microsoft.com/v1.0/directoryObjects/u1"])
        );
    }

    #[test]
    fn explicit_nickname_wins_and_blank_name_fails() {
        let mut g = new_group("Sales Team");
        g.mail_nickname = Some("sales".into());
        let body = create_body(GroupKind::Security, &g, BASE).unwrap();
        assert_eq!(body["mailNickname"], "sales");
        assert!(create_body(GroupKind::Security, &new_group("  "), BASE).is_err());
    }

    #[test]
    fn owner_actions_only_parse_for_m365_groups() {
        let args = json!({"action": "add_owners", "groupId": "g", "ownerIds": ["u"]});
        assert!(serde_json::from_value::<GroupArgs>(args.clone()).is_err());
        assert!(serde_json::from_value::<M365GroupArgs>(args).is_ok());
    }

    #[test]
    fn list_without_options_parses() {
        let args: GroupArgs = serde_json::from_value(json!({"action": "list"})).unwrap();
        assert!(matches!(args, GroupArgs::List(q) if q.top.is_none()));
    }
}
