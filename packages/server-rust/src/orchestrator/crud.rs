//! Single-call CRUD orchestrations.
//!
//! Every role, permission, user and menu-item operation is one forward with
//! the operation's reply field projected out of the body. The catalog below
//! is static: adding an operation is adding a row.

use std::sync::Arc;

use edgeway_core::{CorrelationContext, OrchestratorResult, Value};
use tracing::{debug, info};

use crate::config::SubjectConfig;
use crate::service::{ForwardRequest, RemoteForwarder};

/// Backend family an operation is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Roles, permissions and users.
    Identity,
    /// Navigation menu items.
    Navigation,
}

/// How the projected reply field becomes the result body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// The field as returned.
    Field,
    /// The field's truthiness. Used by `remove*` operations.
    Boolean,
}

/// One catalogued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrudOperation {
    /// URL resource segment.
    pub resource: &'static str,
    /// URL action segment.
    pub action: &'static str,
    /// Reply field holding the result. Also the operation label.
    pub field: &'static str,
    pub backend: Backend,
    pub document: &'static str,
    pub projection: Projection,
}

macro_rules! op {
    ($resource:literal, $action:literal, $field:literal, $backend:ident, $projection:ident, $doc:expr) => {
        CrudOperation {
            resource: $resource,
            action: $action,
            field: $field,
            backend: Backend::$backend,
            document: $doc,
            projection: Projection::$projection,
        }
    };
}

/// Every CRUD operation the gateway exposes.
pub static CATALOG: &[CrudOperation] = &[
    // roles
    op!("roles", "createRole", "createRole", Identity, Field, concat!(
        "mutation CreateRole($createRoleInput: CreateRoleInput!) { createRole(createRoleInput: $createRoleInput) { ",
        "id name description createdAt updatedAt", " } }"
    )),
    op!("roles", "findAllRoles", "findAllRoles", Identity, Field, concat!(
        "query FindAllRoles($paginationInput: PaginationInput) { findAllRoles(paginationInput: $paginationInput) { ",
        "items { id name description createdAt updatedAt } totalItems totalPages currentPage itemsPerPage } }"
    )),
    op!("roles", "findRole", "findRoleById", Identity, Field, concat!(
        "query FindRoleById($id: ID!) { findRoleById(id: $id) { ",
        "id name description createdAt updatedAt", " } }"
    )),
    op!("roles", "updateRole", "updateRole", Identity, Field, concat!(
        "mutation UpdateRole($id: ID!, $updateRoleInput: UpdateRoleInput!) { updateRole(id: $id, updateRoleInput: $updateRoleInput) { ",
        "id name description createdAt updatedAt", " } }"
    )),
    op!("roles", "removeRole", "removeRole", Identity, Boolean,
        "mutation RemoveRole($id: ID!) { removeRole(id: $id) }"),
    op!("roles", "assignPermissionsToRole", "assignPermissionsToRole", Identity, Field, concat!(
        "mutation AssignPermissionsToRole($assignPermissionsToRoleInput: AssignPermissionsToRoleInput!) { ",
        "assignPermissionsToRole(assignPermissionsToRoleInput: $assignPermissionsToRoleInput) { ",
        "id name isActive createdAt updatedAt permissions { id name description createdAt updatedAt } } }"
    )),
    // permissions
    op!("permissions", "createPermission", "createPermission", Identity, Field, concat!(
        "mutation CreatePermission($createPermissionInput: CreatePermissionInput!) { ",
        "createPermission(createPermissionInput: $createPermissionInput) { id name description } }"
    )),
    op!("permissions", "findAllPermissions", "findAllPermissions", Identity, Field, concat!(
        "query FindAllPermissions($paginationInput: PaginationInput) { findAllPermissions(paginationInput: $paginationInput) { ",
        "items { id name description } totalItems totalPages currentPage itemsPerPage } }"
    )),
    op!("permissions", "findPermission", "findPermissionById", Identity, Field,
        "query FindPermissionById($id: ID!) { findPermissionById(id: $id) { id name description } }"),
    op!("permissions", "findPermissionByName", "findPermissionByName", Identity, Field,
        "query FindPermissionByName($name: String!) { findPermissionByName(name: $name) { id name description } }"),
    op!("permissions", "updatePermission", "updatePermission", Identity, Field, concat!(
        "mutation UpdatePermission($id: ID!, $updatePermissionInput: UpdatePermissionInput!) { ",
        "updatePermission(id: $id, updatePermissionInput: $updatePermissionInput) { id name description } }"
    )),
    op!("permissions", "removePermission", "removePermission", Identity, Boolean,
        "mutation RemovePermission($id: ID!) { removePermission(id: $id) }"),
    // users
    op!("users", "createUser", "createUser", Identity, Field, concat!(
        "mutation CreateUser($createUserInput: CreateUserInput!) { createUser(createUserInput: $createUserInput) { ",
        "id email dni name lastName isActive avatarUrl avatarPublicId createdAt updatedAt roleId role { id name description }",
        " } }"
    )),
    op!("users", "findAllUsers", "findAllUsers", Identity, Field, concat!(
        "query FindAllUsers($paginationInput: PaginationInput) { findAllUsers(paginationInput: $paginationInput) { items { ",
        "id email dni name lastName isActive avatarUrl avatarPublicId createdAt updatedAt roleId role { id name description }",
        " } totalItems totalPages currentPage itemsPerPage } }"
    )),
    op!("users", "findUser", "findUserById", Identity, Field, concat!(
        "query FindUserById($id: ID!) { findUserById(id: $id) { ",
        "id email dni name lastName isActive avatarUrl avatarPublicId createdAt updatedAt roleId role { id name description }",
        " } }"
    )),
    op!("users", "searchUsers", "searchUsers", Identity, Field, concat!(
        "query SearchUsers($paginationInput: UsersPaginationInput) { searchUsers(paginationInput: $paginationInput) { items { ",
        "id email dni name lastName isActive avatarUrl avatarPublicId createdAt updatedAt roleId role { id name description }",
        " } totalItems totalPages currentPage itemsPerPage } }"
    )),
    op!("users", "updateUser", "updateUser", Identity, Field, concat!(
        "mutation UpdateUser($id: ID!, $updateUserInput: UpdateUserInput!) { updateUser(id: $id, updateUserInput: $updateUserInput) { ",
        "id email dni name lastName isActive avatarUrl avatarPublicId createdAt updatedAt roleId role { id name description }",
        " } }"
    )),
    op!("users", "updateUserStatus", "updateUserStatus", Identity, Field, concat!(
        "mutation UpdateUserStatus($id: ID!, $updateUserStatusInput: UpdateUserStatusInput!) { ",
        "updateUserStatus(id: $id, updateUserStatusInput: $updateUserStatusInput) { ",
        "id email dni name lastName isActive avatarUrl avatarPublicId createdAt updatedAt roleId role { id name description }",
        " } }"
    )),
    op!("users", "removeUser", "removeUser", Identity, Boolean,
        "mutation RemoveUser($id: ID!) { removeUser(id: $id) }"),
    // menu items
    op!("menu-items", "createMenuItem", "createMenuItem", Navigation, Field, concat!(
        "mutation CreateMenuItem($createMenuItemInput: CreateMenuItemInput!) { createMenuItem(createMenuItemInput: $createMenuItemInput) { ",
        "id label path icon isActive order parentId requiredPermissions createdAt updatedAt ",
        "children { id label path icon isActive order parentId requiredPermissions } } }"
    )),
    op!("menu-items", "findAllMenuItems", "findAllMenuItems", Navigation, Field, concat!(
        "query FindAllMenuItems { findAllMenuItems { ",
        "id label path icon isActive order parentId requiredPermissions createdAt updatedAt ",
        "children { id label path icon isActive order parentId requiredPermissions } } }"
    )),
    op!("menu-items", "findActiveMenuItemsForAdmin", "findActiveMenuItemsForAdmin", Navigation, Field, concat!(
        "query FindActiveMenuItemsForAdmin { findActiveMenuItemsForAdmin { ",
        "id label path icon isActive order parentId requiredPermissions createdAt updatedAt ",
        "children { id label path icon isActive order parentId requiredPermissions } } }"
    )),
    op!("menu-items", "updateMenuItem", "updateMenuItem", Navigation, Field, concat!(
        "mutation UpdateMenuItem($updateMenuItemInput: UpdateMenuItemInput!) { updateMenuItem(updateMenuItemInput: $updateMenuItemInput) { ",
        "id label path icon isActive order parentId requiredPermissions createdAt updatedAt ",
        "children { id label path icon isActive order parentId requiredPermissions } } }"
    )),
    op!("menu-items", "removeMenuItem", "removeMenuItem", Navigation, Boolean,
        "mutation RemoveMenuItem($id: ID!) { removeMenuItem(id: $id) { id label } }"),
];

/// Finds the operation for `resource`/`action`.
#[must_use]
pub fn lookup(resource: &str, action: &str) -> Option<&'static CrudOperation> {
    CATALOG
        .iter()
        .find(|op| op.resource == resource && op.action == action)
}

/// Pulls the operation's field out of a successful reply body.
fn project(body: Option<Value>, op: &CrudOperation) -> Value {
    let field = body.and_then(|mut b| b.take(op.field)).unwrap_or_default();
    match op.projection {
        Projection::Field => field,
        Projection::Boolean => Value::Bool(field.is_truthy()),
    }
}

/// Runs catalogued operations through the forwarder.
pub struct CrudOrchestrator {
    forwarder: Arc<RemoteForwarder>,
    subjects: SubjectConfig,
}

impl CrudOrchestrator {
    #[must_use]
    pub fn new(forwarder: Arc<RemoteForwarder>, subjects: SubjectConfig) -> Self {
        Self {
            forwarder,
            subjects,
        }
    }

    fn subject(&self, backend: Backend) -> &str {
        match backend {
            Backend::Identity => &self.subjects.graphql,
            Backend::Navigation => &self.subjects.sidebar_graphql,
        }
    }

    /// Forwards `op` once and projects its reply field.
    ///
    /// Failures pass through unchanged. A success whose reply lacks the field
    /// carries a null body (`false` for boolean projections).
    pub async fn execute(
        &self,
        op: &CrudOperation,
        variables: serde_json::Map<String, serde_json::Value>,
        ctx: &CorrelationContext,
    ) -> OrchestratorResult<Value> {
        info!(
            correlation_id = ctx.id(),
            resource = op.resource,
            action = op.action,
            "crud orchestration started"
        );
        let request = ForwardRequest::new(self.subject(op.backend), op.field, op.document)
            .variables(variables);
        let result = self.forwarder.forward(ctx, request).await;
        if !result.is_success() {
            return result;
        }
        debug!(correlation_id = ctx.id(), field = op.field, "projecting reply field");
        let mut result = result;
        let body = result.body.take();
        result.body = Some(project(body, op));
        result
    }
}
